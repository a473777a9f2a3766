//! Macros shared by the route modules.

/// Implement `FromRef<AppState>` for a field so handlers can extract it
/// directly.
///
/// # Example
/// ```ignore
/// impl_from_ref!(Arc<AccountService>, accounts);
/// // Expands to:
/// impl axum::extract::FromRef<AppState> for Arc<AccountService> {
///     fn from_ref(state: &AppState) -> Self {
///         state.accounts.clone()
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<$crate::state::AppState> for $type {
            fn from_ref(state: &$crate::state::AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}
