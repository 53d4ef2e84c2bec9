//! Ownership annotations emitted by the binding generator
//!
//! Generated wrappers do not call the ownership primitives directly; each
//! annotated argument or return value is run through
//! [`Bridge::apply_annotation`] after the native call.

use super::Bridge;
use ferrule_sdk::{BridgeError, BridgeResult, ProxyId, Value};
use serde::{Deserialize, Serialize};

/// Ownership annotation on an argument or return value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipAnnotation {
    /// The return value is a new object the host owns
    Factory,
    /// The argument passes to native code, owned by the receiver when
    /// there is one
    Transfer,
    /// The return value passes back to host ownership
    TransferBack,
    /// The receiver is given to the argument (a parent); `None` returns
    /// it to the host
    TransferThis,
    /// The argument is kept alive by the receiver under the given key
    KeepReference(String),
}

impl Bridge {
    /// Apply an annotation to `target`, the annotated argument or return
    /// value of a call on `this`
    pub fn apply_annotation(
        &mut self,
        annotation: &OwnershipAnnotation,
        target: &Value,
        this: Option<ProxyId>,
    ) -> BridgeResult<()> {
        match annotation {
            OwnershipAnnotation::Factory | OwnershipAnnotation::TransferBack => {
                match proxy_or_none(target)? {
                    Some(id) => self.take_ownership(id),
                    None => Ok(()),
                }
            }
            OwnershipAnnotation::Transfer => match proxy_or_none(target)? {
                Some(id) => self.give_ownership(id, this, this.is_none()),
                None => Ok(()),
            },
            OwnershipAnnotation::TransferThis => {
                let this = this.ok_or_else(|| {
                    BridgeError::type_mismatch("bound receiver for transferThis", "no receiver")
                })?;
                match proxy_or_none(target)? {
                    Some(parent) => self.give_ownership(this, Some(parent), false),
                    None => self.take_ownership(this),
                }
            }
            OwnershipAnnotation::KeepReference(key) => {
                self.keep_reference(target.clone(), key, this)
            }
        }
    }
}

fn proxy_or_none(value: &Value) -> BridgeResult<Option<ProxyId>> {
    match value {
        Value::None => Ok(None),
        Value::Proxy(id) => Ok(Some(*id)),
        other => Err(BridgeError::type_mismatch("wrapped object", other.kind().name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassBuilder;
    use crate::proxy::Ownership;
    use ferrule_sdk::NativePtr;

    fn setup() -> (Bridge, ProxyId, ProxyId) {
        let mut bridge = Bridge::new();
        let c = bridge.register_class(ClassBuilder::new("Window")).unwrap();
        let frame = bridge.construct(c, |_| Ok(NativePtr::new(0x10))).unwrap();
        let button = bridge.construct(c, |_| Ok(NativePtr::new(0x20))).unwrap();
        (bridge, frame, button)
    }

    #[test]
    fn test_transfer_to_receiver() {
        let (mut bridge, frame, button) = setup();
        bridge
            .apply_annotation(&OwnershipAnnotation::Transfer, &Value::Proxy(button), Some(frame))
            .unwrap();
        assert_eq!(bridge.children(frame), vec![button]);

        bridge
            .apply_annotation(&OwnershipAnnotation::TransferBack, &Value::Proxy(button), None)
            .unwrap();
        assert!(bridge.children(frame).is_empty());
        assert!(bridge.proxy(button).unwrap().owned_by_host());
    }

    #[test]
    fn test_transfer_without_receiver_pins() {
        let (mut bridge, _, button) = setup();
        bridge
            .apply_annotation(&OwnershipAnnotation::Transfer, &Value::Proxy(button), None)
            .unwrap();
        assert_eq!(
            bridge.proxy(button).unwrap().ownership(),
            Ownership::NativeOwnedWithExternalRef
        );
    }

    #[test]
    fn test_transfer_this_and_keep_reference() {
        let (mut bridge, frame, button) = setup();
        bridge
            .apply_annotation(&OwnershipAnnotation::TransferThis, &Value::Proxy(frame), Some(button))
            .unwrap();
        assert_eq!(bridge.parent_of(button), Some(frame));
        bridge
            .apply_annotation(&OwnershipAnnotation::TransferThis, &Value::None, Some(button))
            .unwrap();
        assert_eq!(bridge.parent_of(button), None);

        let key = OwnershipAnnotation::KeepReference("label".into());
        bridge.apply_annotation(&key, &Value::str("OK"), Some(button)).unwrap();
        assert_eq!(bridge.kept_reference(button, "label"), Some(&Value::str("OK")));
    }

    #[test]
    fn test_annotation_json_form() {
        let parsed: Vec<OwnershipAnnotation> =
            serde_json::from_str(r#"["factory", "transfer_back", {"keep_reference": "k"}]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                OwnershipAnnotation::Factory,
                OwnershipAnnotation::TransferBack,
                OwnershipAnnotation::KeepReference("k".into())
            ]
        );
    }
}
