use std::sync::Arc;

use serde_json::Value;

use crate::error::FacadeError;
use crate::forward::Forward;
use crate::interfaces::container::{Container, Instance};

/// Static access point for the service bound under a fixed key.
///
/// Implementors are zero-sized markers; nothing resolved is ever stored on
/// them. Each call goes back to the container, so scoping is entirely the
/// container's business.
///
/// ```rust
/// use std::sync::Arc;
/// use ufacade::{BasicContainer, Facade};
///
/// trait Clock: Send + Sync {
///     fn now(&self) -> u64;
/// }
///
/// struct Fixed;
/// impl Clock for Fixed {
///     fn now(&self) -> u64 { 1_700_000_000 }
/// }
///
/// #[derive(Facade)]
/// #[facade(key = "app.clock", target = dyn Clock)]
/// struct AppClock;
///
/// let container = BasicContainer::new();
/// container.instance(AppClock::accessor_key(), Arc::new(Fixed) as Arc<dyn Clock>);
/// assert_eq!(AppClock::resolve(&container).unwrap().now(), 1_700_000_000);
/// ```
pub trait Facade {
    type Target: ?Sized + Send + Sync + 'static;

    fn accessor_key() -> &'static str;

    fn resolve<C>(container: &C) -> Result<Arc<Self::Target>, FacadeError>
    where
        C: Container + ?Sized,
    {
        let key = Self::accessor_key();
        let instance = container.resolve_any(key)?;
        Ok(instance.downcast_for::<Self::Target>(key)?)
    }

    /// Forward `method` to the resolved target.
    ///
    /// Errors raised by the method come back as `FacadeError::Service` with
    /// the original error inside.
    fn invoke<C>(container: &C, method: &str, args: Vec<Value>) -> Result<Value, FacadeError>
    where
        C: Container + ?Sized,
        Self::Target: Forward,
    {
        let target = Self::resolve(container)?;
        target.call(method, args).map_err(|e| match e {
            FacadeError::MethodNotFound { method, .. } => FacadeError::MethodNotFound {
                key: Self::accessor_key().to_string(),
                method,
            },
            other => other,
        })
    }

    /// Rebind the key to `instance`, e.g. to install a fake in tests.
    fn swap<C>(container: &C, instance: Arc<Self::Target>)
    where
        C: Container + ?Sized,
    {
        container.instance_any(Self::accessor_key(), Instance::new(instance));
    }

    fn is_bound<C>(container: &C) -> bool
    where
        C: Container + ?Sized,
    {
        container.has(Self::accessor_key())
    }
}
