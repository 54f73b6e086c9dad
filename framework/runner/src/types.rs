/// Result type used across the runner. Precondition failures are carried as the concrete error
/// types from `ldap_siege_core` so callers can `downcast_ref` them.
pub type SiegeResult<T> = anyhow::Result<T>;
