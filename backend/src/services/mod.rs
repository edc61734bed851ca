pub mod auth;
pub mod background_jobs;
pub mod notifications;
pub mod recurrence;
pub mod recurring_tasks;
pub mod reminder_scheduler;
pub mod reminders;
pub mod schedule_registry;
pub mod todos;

#[cfg(test)]
pub(crate) mod test_support;
