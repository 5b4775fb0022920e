//! Opaque user values carried through the runtime.

use serde::{Deserialize, Serialize};

/// User data: message payloads and process state. The runtime never looks
/// inside; transports serialize it as-is.
pub type Payload = serde_json::Value;

/// The reason attached to a failure traveling through supervision.
///
/// User code produces faults (a failed handler, a thrown strategy, a caught
/// panic); the runtime forwards them as the `reason` of a supervision
/// request or a termination. Faults are user errors, never invariant
/// violations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fault(Payload);

impl Fault {
    pub fn new(reason: impl Into<Payload>) -> Self {
        Self(reason.into())
    }

    /// Recover a readable reason from a caught panic payload.
    pub fn from_panic(panic: Box<dyn std::any::Any + Send>) -> Self {
        let text = if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = panic.downcast_ref::<&str>() {
            (*s).to_string()
        } else {
            "unknown panic".to_string()
        };
        Self(Payload::String(format!("panic: {text}")))
    }

    pub fn reason(&self) -> &Payload {
        &self.0
    }

    pub fn into_reason(self) -> Payload {
        self.0
    }
}

impl From<&str> for Fault {
    fn from(reason: &str) -> Self {
        Self(Payload::String(reason.to_string()))
    }
}

impl From<String> for Fault {
    fn from(reason: String) -> Self {
        Self(Payload::String(reason))
    }
}

impl From<Payload> for Fault {
    fn from(reason: Payload) -> Self {
        Self(reason)
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Payload::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_from_str_displays_bare() {
        let fault = Fault::from("boom");
        assert_eq!(fault.to_string(), "boom");
        assert_eq!(fault.reason(), &Payload::String("boom".into()));
    }

    #[test]
    fn test_fault_from_panic_string() {
        let panic: Box<dyn std::any::Any + Send> = Box::new("went sideways".to_string());
        let fault = Fault::from_panic(panic);
        assert_eq!(fault.to_string(), "panic: went sideways");
    }

    #[test]
    fn test_fault_from_panic_unknown() {
        let panic: Box<dyn std::any::Any + Send> = Box::new(17_u32);
        assert_eq!(Fault::from_panic(panic).to_string(), "panic: unknown panic");
    }

    #[test]
    fn test_fault_serde_is_transparent() {
        let fault = Fault::from("boom");
        assert_eq!(serde_json::to_string(&fault).unwrap(), "\"boom\"");
    }
}
