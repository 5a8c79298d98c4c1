//! Value objects: compared by value, never by identity.

/// Marker for immutable domain values such as [`crate::Money`].
///
/// Two values with the same attributes are interchangeable; "changing" one
/// means constructing a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
