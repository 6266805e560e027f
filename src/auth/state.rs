//! Authentication state trait and macro.

use crate::cli::IpExtractor;
use crate::session::SessionManager;

/// Trait for state types that can verify access tokens and identify clients.
pub trait HasAuthBackend {
    fn sessions(&self) -> &SessionManager;
    fn ip_extractor(&self) -> Option<&IpExtractor>;
}

/// Macro to implement `HasAuthBackend` for state structs with
/// `sessions: SessionManager` and `ip_extractor: Option<IpExtractor>` fields.
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub sessions: SessionManager,
///     pub ip_extractor: Option<IpExtractor>,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn sessions(&self) -> &$crate::session::SessionManager {
                &self.sessions
            }

            fn ip_extractor(&self) -> Option<&$crate::cli::IpExtractor> {
                self.ip_extractor.as_ref()
            }
        }
    };
}
