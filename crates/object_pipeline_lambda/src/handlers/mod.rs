pub mod check;
pub mod create;
pub mod delete;
pub mod update;

pub use check::handle_check;
pub use create::handle_create;
pub use delete::handle_delete;
pub use update::handle_update;

#[cfg(test)]
pub(crate) mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use lambda_runtime::Context;

    /// An invocation with thirty seconds left on the clock.
    pub(crate) fn invocation() -> Context {
        let deadline = SystemTime::now() + Duration::from_secs(30);
        let mut context = Context::default();
        context.request_id = "req-handler".to_string();
        context.deadline = deadline
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_millis() as u64;
        context
    }
}
