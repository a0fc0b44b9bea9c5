use crate::forward::Forward;
use crate::Facade;

/// Facade for the service bound under `understand.field-provider`.
///
/// The service itself is supplied by the application; any [`Forward`]
/// implementation can be bound.
#[derive(Debug, Clone, Copy, Default, Facade)]
#[facade(key = "understand.field-provider", target = dyn Forward)]
pub struct UnderstandFieldProvider;
