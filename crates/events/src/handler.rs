/// Run a command against an aggregate in memory: decide, then apply.
///
/// No store and no bus. Domain tests use this to walk an aggregate through
/// its lifecycle; production code goes through `CommandDispatcher`.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: sitebook_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
