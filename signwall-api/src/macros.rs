//! Utility macros for reducing boilerplate

/// Implement `FromRef<AppState>` for a cloneable field of [`AppState`].
///
/// ```ignore
/// impl_from_ref!(Arc<SigningService>, signing);
/// // Expands to:
/// impl axum::extract::FromRef<AppState> for Arc<SigningService> {
///     fn from_ref(state: &AppState) -> Self {
///         state.signing.clone()
///     }
/// }
/// ```
///
/// [`AppState`]: crate::state::AppState
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
