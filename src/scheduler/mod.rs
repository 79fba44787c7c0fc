//! Background loops, all owned by the service's [`TaskSupervisor`].

pub mod task_supervisor;
pub mod tasks;

use crate::domain::crisis::service::crisis_service::CrisisService;

pub use task_supervisor::TaskSupervisor;

/// Starts the escalation monitor and the retention sweeper.
pub fn spawn_background_tasks(service: &CrisisService) {
    let supervisor = service.supervisor();

    supervisor.spawn(tasks::escalation::task::run(
        service.clone(),
        supervisor.shutdown_signal(),
    ));
    supervisor.spawn(tasks::retention::task::run(
        service.clone(),
        supervisor.shutdown_signal(),
    ));
}
