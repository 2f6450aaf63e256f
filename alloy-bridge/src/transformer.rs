//! Class transformer: rewrites targeted methods to call into the loader's
//! hook class at a fixed injection point, before the host links its own
//! classes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use custom_error::custom_error;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::classfile::{ClassFile, ClassFileError, Instruction};

custom_error! {pub TransformError
    ClassFile { source: ClassFileError } = "{source}",
    SitesLocked = "transformation sites cannot be added after the first transform() call",
    DescriptorMismatch { class: String, method: String, bridge_method: String, reason: String } =
        "bridge method '{bridge_method}' is not return-compatible with '{class}#{method}': {reason}",
    CallSiteNotFound { class: String, method: String, call_target: String } =
        "no call to '{call_target}' found in '{class}#{method}' for a BeforeCall injection",
    ReturnNotFound { class: String, method: String } =
        "'{class}#{method}' has no terminal instruction to inject a Return-point bridge call before",
}

/// Where, within the target method, the bridge call is injected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionPoint {
    Entry,
    Return,
    /// Inject immediately before the first call matching this symbolic
    /// target, formatted `"owner.method.descriptor"`.
    BeforeCall(String),
}

/// How the surrounding method reacts to the bridge method's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationPolicy {
    NonCancellable,
    ReturnIfTrue,
    ReturnValueIfNonNull,
}

/// A row in the transformer's static table.
#[derive(Debug, Clone)]
pub struct TransformationSite {
    pub target_class: String,
    pub target_method: String,
    pub target_descriptor: String,
    pub injection_point: InjectionPoint,
    pub bridge_class: String,
    pub bridge_method: String,
    pub cancellation_policy: CancellationPolicy,
}

impl TransformationSite {
    fn validate_return_compatibility(&self) -> Result<(), TransformError> {
        let method_return = return_type_token(&self.target_descriptor);
        let ok = match self.cancellation_policy {
            CancellationPolicy::NonCancellable => true,
            CancellationPolicy::ReturnIfTrue => true, // bridge returns bool regardless of method_return
            CancellationPolicy::ReturnValueIfNonNull => method_return != "V",
        };
        if ok {
            Ok(())
        } else {
            Err(TransformError::DescriptorMismatch {
                class: self.target_class.clone(),
                method: self.target_method.clone(),
                bridge_method: self.bridge_method.clone(),
                reason: "ReturnValueIfNonNull cannot be used on a void method".to_string(),
            })
        }
    }
}

fn return_type_token(descriptor: &str) -> &str {
    descriptor.rsplit(')').next().unwrap_or(descriptor)
}

/// Installs [`TransformationSite`]s and applies them to class bytes as the
/// host loads them. Sites may only be added before the first [`transform`]
/// call invariant (iii).
///
/// [`transform`]: ClassTransformer::transform
pub struct ClassTransformer {
    sites_by_class: Mutex<HashMap<String, Vec<TransformationSite>>>,
    locked: AtomicBool,
}

impl Default for ClassTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassTransformer {
    pub fn new() -> Self {
        ClassTransformer {
            sites_by_class: Mutex::new(HashMap::new()),
            locked: AtomicBool::new(false),
        }
    }

    pub fn add_site(&self, site: TransformationSite) -> Result<(), TransformError> {
        if self.locked.load(Ordering::Acquire) {
            return Err(TransformError::SitesLocked);
        }
        site.validate_return_compatibility()?;
        debug!(
            class = %site.target_class,
            method = %site.target_method,
            bridge_method = %site.bridge_method,
            "registered transformation site"
        );
        self.sites_by_class
            .lock()
            .entry(site.target_class.clone())
            .or_default()
            .push(site);
        Ok(())
    }

    /// Applies every registered site for `class_name` to `bytes`, returning
    /// the modified class bytes. Idempotent: a class whose target methods
    /// are already marked transformed comes back byte-identical. Classes
    /// with no matching sites are parsed and reassembled unchanged.
    pub fn transform(&self, class_name: &str, bytes: &[u8]) -> Result<Vec<u8>, TransformError> {
        self.locked.store(true, Ordering::Release);

        let sites = self.sites_by_class.lock();
        let Some(sites) = sites.get(class_name) else {
            return Ok(bytes.to_vec());
        };

        let mut class = ClassFile::parse(bytes)?;
        for site in sites {
            apply_site(&mut class, site)?;
        }
        let out = class.to_bytes();
        info!(class = class_name, sites = sites.len(), "transformed class");
        Ok(out)
    }
}

fn apply_site(class: &mut ClassFile, site: &TransformationSite) -> Result<(), TransformError> {
    let class_name = class.name.clone();
    let method = class
        .method_mut(&site.target_method, &site.target_descriptor)
        .ok_or_else(|| TransformError::CallSiteNotFound {
            class: class_name.clone(),
            method: site.target_method.clone(),
            call_target: "<method not found>".to_string(),
        })?;

    if method.transformed {
        return Ok(());
    }

    let call = Instruction::InvokeBridge {
        bridge_class: site.bridge_class.clone(),
        bridge_method: site.bridge_method.clone(),
        descriptor: site.target_descriptor.clone(),
    };

    let mut prologue = vec![call];
    match site.cancellation_policy {
        CancellationPolicy::NonCancellable => {}
        CancellationPolicy::ReturnIfTrue => prologue.push(Instruction::IfTrueReturnDefault),
        CancellationPolicy::ReturnValueIfNonNull => {
            prologue.push(Instruction::IfNonNullReturnValue)
        }
    }

    match &site.injection_point {
        InjectionPoint::Entry => {
            method.instructions.splice(0..0, prologue);
        }
        InjectionPoint::Return => {
            if method.instructions.is_empty() {
                return Err(TransformError::ReturnNotFound {
                    class: class_name,
                    method: site.target_method.clone(),
                });
            }
            let insert_at = method.instructions.len() - 1;
            method.instructions.splice(insert_at..insert_at, prologue);
        }
        InjectionPoint::BeforeCall(target) => {
            let index = method
                .instructions
                .iter()
                .position(|instruction| call_target_matches(instruction, target))
                .ok_or_else(|| TransformError::CallSiteNotFound {
                    class: class_name.clone(),
                    method: site.target_method.clone(),
                    call_target: target.clone(),
                })?;
            method.instructions.splice(index..index, prologue);
        }
    }

    method.transformed = true;
    Ok(())
}

fn call_target_matches(instruction: &Instruction, target: &str) -> bool {
    match instruction {
        Instruction::InvokeBridge {
            bridge_class,
            bridge_method,
            descriptor,
        } => format!("{bridge_class}.{bridge_method}.{descriptor}") == target,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::MethodBody;

    fn class_with_method(descriptor: &str) -> ClassFile {
        ClassFile {
            name: "com.example.Host".to_string(),
            methods: vec![MethodBody {
                name: "onBreak".to_string(),
                descriptor: descriptor.to_string(),
                transformed: false,
                instructions: vec![Instruction::Opaque {
                    opcode: 0x01,
                    payload: vec![],
                }],
            }],
        }
    }

    fn site(cancellation_policy: CancellationPolicy, injection_point: InjectionPoint) -> TransformationSite {
        TransformationSite {
            target_class: "com.example.Host".to_string(),
            target_method: "onBreak".to_string(),
            target_descriptor: "()Z".to_string(),
            injection_point,
            bridge_class: "alloy.Hooks".to_string(),
            bridge_method: "onBlockBreak".to_string(),
            cancellation_policy,
        }
    }

    #[test]
    fn entry_injection_prepends_bridge_call() {
        let transformer = ClassTransformer::new();
        transformer
            .add_site(site(CancellationPolicy::ReturnIfTrue, InjectionPoint::Entry))
            .unwrap();

        let bytes = class_with_method("()Z").to_bytes();
        let transformed = transformer.transform("com.example.Host", &bytes).unwrap();
        let class = ClassFile::parse(&transformed).unwrap();
        let method = &class.methods[0];
        assert!(method.transformed);
        assert_eq!(method.instructions[0], Instruction::InvokeBridge {
            bridge_class: "alloy.Hooks".to_string(),
            bridge_method: "onBlockBreak".to_string(),
            descriptor: "()Z".to_string(),
        });
        assert_eq!(method.instructions[1], Instruction::IfTrueReturnDefault);
    }

    #[test]
    fn transform_is_idempotent() {
        let transformer = ClassTransformer::new();
        transformer
            .add_site(site(CancellationPolicy::NonCancellable, InjectionPoint::Entry))
            .unwrap();

        let bytes = class_with_method("()Z").to_bytes();
        let once = transformer.transform("com.example.Host", &bytes).unwrap();
        let twice = transformer.transform("com.example.Host", &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn unrelated_class_passes_through_unchanged() {
        let transformer = ClassTransformer::new();
        transformer
            .add_site(site(CancellationPolicy::NonCancellable, InjectionPoint::Entry))
            .unwrap();

        let bytes = class_with_method("()Z").to_bytes();
        let out = transformer.transform("com.example.Other", &bytes).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn sites_cannot_be_added_after_first_transform() {
        let transformer = ClassTransformer::new();
        let bytes = class_with_method("()Z").to_bytes();
        transformer.transform("com.example.Host", &bytes).unwrap();

        let err = transformer
            .add_site(site(CancellationPolicy::NonCancellable, InjectionPoint::Entry))
            .unwrap_err();
        assert!(matches!(err, TransformError::SitesLocked));
    }

    #[test]
    fn return_value_if_non_null_rejects_void_method() {
        let transformer = ClassTransformer::new();
        let mut void_site = site(CancellationPolicy::ReturnValueIfNonNull, InjectionPoint::Entry);
        void_site.target_descriptor = "()V".to_string();
        let err = transformer.add_site(void_site).unwrap_err();
        assert!(matches!(err, TransformError::DescriptorMismatch { .. }));
    }

    #[test]
    fn before_call_injects_immediately_before_matching_call() {
        let transformer = ClassTransformer::new();
        transformer
            .add_site(site(
                CancellationPolicy::NonCancellable,
                InjectionPoint::BeforeCall("host.Registry.explode.()V".to_string()),
            ))
            .unwrap();

        let mut class = class_with_method("()Z");
        class.methods[0].instructions.push(Instruction::InvokeBridge {
            bridge_class: "host.Registry".to_string(),
            bridge_method: "explode".to_string(),
            descriptor: "()V".to_string(),
        });
        let bytes = class.to_bytes();

        let transformed = transformer.transform("com.example.Host", &bytes).unwrap();
        let class = ClassFile::parse(&transformed).unwrap();
        let instructions = &class.methods[0].instructions;
        let call_index = instructions
            .iter()
            .position(|i| call_target_matches(i, "host.Registry.explode.()V"))
            .unwrap();
        assert_eq!(
            instructions[call_index - 1],
            Instruction::InvokeBridge {
                bridge_class: "alloy.Hooks".to_string(),
                bridge_method: "onBlockBreak".to_string(),
                descriptor: "()Z".to_string(),
            }
        );
    }
}
