//! Workforce domain module (event-sourced).
//!
//! The worker roster and the daily attendance sheets kept per project.
//! Balances owed to workers live in `sitebook-ledger`, not here.

pub mod attendance;
pub mod worker;

pub use attendance::{
    AttendanceCommand, AttendanceEntry, AttendanceEvent, AttendanceRecorded, AttendanceSheet,
    AttendanceSheetId, AttendanceStatus, RecordAttendance,
};
pub use worker::{
    PaymentType, RegisterWorker, RemoveWorker, UpdateWorkerProfile, Worker, WorkerCommand, WorkerEvent,
    WorkerId, WorkerProfileUpdated, WorkerRegistered, WorkerRemoved,
};
