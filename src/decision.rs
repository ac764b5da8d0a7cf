//! Engine decision: which engine handles the body, and whether attachment
//! conversion is enabled.
//!
//! Two independent decisions are resolved through the same strict precedence
//! chain, most-specific to least-specific:
//!
//! 1. **Explicit global override** ([`EngineOverrides`]) — wins outright and
//!    disables flag evaluation for that decision. Set by operators to pin
//!    behaviour during incidents or rollouts.
//!
//! 2. **Rollout flags** — per-tenant percentage rollouts read from an
//!    immutable [`FlagSnapshot`]. A tenant's bucket is a deterministic hash
//!    of its id, so the same tenant always lands on the same side of a given
//!    percentage.
//!
//! 3. **Hardcoded safe default** — local engine, attachments disabled. The
//!    local engine needs no credentials and no network, so the default can
//!    never be misconfigured into an outage.
//!
//! [`decide_engines`] is a pure function of its inputs: no environment
//! reads, no mutation, same snapshot in → same decision out. The returned
//! `reasons` list records which rule fired for each decision, in evaluation
//! order, for observability.

use crate::config::{EngineOverrides, SubscriptionTier};
use crate::collab::FlagSnapshot;
use crate::outcome::EngineKind;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Rollout flag: percentage of tenants whose body conversion uses the cloud
/// engine.
pub const FLAG_CLOUD_BODY: &str = "conversion.cloud_body_rollout";

/// Rollout flag: percentage of tenants with attachment conversion enabled.
pub const FLAG_CONVERT_ATTACHMENTS: &str = "conversion.attachments_rollout";

/// Request context the decision is keyed on.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext {
    pub tenant_id: Uuid,
    pub tier: SubscriptionTier,
}

/// The resolved engine decision plus its evaluation trace.
#[derive(Debug, Clone)]
pub struct EngineDecision {
    pub body_engine: EngineKind,
    pub convert_attachments: bool,
    /// Ordered, human-readable record of which rule fired for each
    /// decision. Logged and attached to audit trails, never parsed.
    pub reasons: Vec<String>,
}

/// Resolve the engine decision for one inbound email.
pub fn decide_engines(
    ctx: &DecisionContext,
    overrides: &EngineOverrides,
    flags: &FlagSnapshot,
) -> EngineDecision {
    let bucket = tenant_bucket(ctx.tenant_id);
    let mut reasons = vec![format!(
        "tenant {} (tier {}, rollout bucket {})",
        ctx.tenant_id,
        ctx.tier.as_str(),
        bucket
    )];

    let body_engine = match overrides.body_engine {
        Some(engine) => {
            reasons.push(format!(
                "body engine forced to '{engine}' by global override; flag evaluation disabled"
            ));
            engine
        }
        None => match flags.rollout(FLAG_CLOUD_BODY) {
            Some(pct) if bucket < pct => {
                reasons.push(format!(
                    "body engine 'cloud': rollout '{FLAG_CLOUD_BODY}' at {pct}% includes bucket {bucket}"
                ));
                EngineKind::Cloud
            }
            Some(pct) => {
                reasons.push(format!(
                    "body engine 'local': rollout '{FLAG_CLOUD_BODY}' at {pct}% excludes bucket {bucket}"
                ));
                EngineKind::Local
            }
            None => {
                reasons.push(
                    "body engine 'local': no override, no rollout flag; safe default".to_string(),
                );
                EngineKind::Local
            }
        },
    };

    let convert_attachments = match overrides.convert_attachments {
        Some(enabled) => {
            reasons.push(format!(
                "attachment conversion {} by global override; flag evaluation disabled",
                if enabled { "enabled" } else { "disabled" }
            ));
            enabled
        }
        None => match flags.rollout(FLAG_CONVERT_ATTACHMENTS) {
            Some(pct) if bucket < pct => {
                reasons.push(format!(
                    "attachment conversion enabled: rollout '{FLAG_CONVERT_ATTACHMENTS}' at {pct}% includes bucket {bucket}"
                ));
                true
            }
            Some(pct) => {
                reasons.push(format!(
                    "attachment conversion disabled: rollout '{FLAG_CONVERT_ATTACHMENTS}' at {pct}% excludes bucket {bucket}"
                ));
                false
            }
            None => {
                reasons.push(
                    "attachment conversion disabled: no override, no rollout flag; safe default"
                        .to_string(),
                );
                false
            }
        },
    };

    EngineDecision {
        body_engine,
        convert_attachments,
        reasons,
    }
}

/// Deterministic rollout bucket in `0..100` for a tenant.
///
/// First two bytes of SHA-256 over the raw UUID bytes, mod 100. Stable
/// across processes and releases, so a tenant never flaps in and out of a
/// fixed-percentage rollout.
pub fn tenant_bucket(tenant_id: Uuid) -> u8 {
    let digest = Sha256::digest(tenant_id.as_bytes());
    (u16::from_be_bytes([digest[0], digest[1]]) % 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DecisionContext {
        DecisionContext {
            tenant_id: Uuid::parse_str("94a7b7f0-3266-4a4f-9d4e-875542d30e62").unwrap(),
            tier: SubscriptionTier::Standard,
        }
    }

    #[test]
    fn override_beats_full_rollout() {
        let overrides = EngineOverrides {
            body_engine: Some(EngineKind::Local),
            convert_attachments: None,
        };
        let flags = FlagSnapshot::new().with_rollout(FLAG_CLOUD_BODY, 100);
        let decision = decide_engines(&ctx(), &overrides, &flags);
        assert_eq!(decision.body_engine, EngineKind::Local);
        assert!(decision
            .reasons
            .iter()
            .any(|r| r.contains("global override")));
    }

    #[test]
    fn full_rollout_selects_cloud() {
        let decision = decide_engines(
            &ctx(),
            &EngineOverrides::default(),
            &FlagSnapshot::new().with_rollout(FLAG_CLOUD_BODY, 100),
        );
        assert_eq!(decision.body_engine, EngineKind::Cloud);
    }

    #[test]
    fn zero_rollout_selects_local() {
        let decision = decide_engines(
            &ctx(),
            &EngineOverrides::default(),
            &FlagSnapshot::new().with_rollout(FLAG_CLOUD_BODY, 0),
        );
        assert_eq!(decision.body_engine, EngineKind::Local);
    }

    #[test]
    fn no_flags_falls_back_to_safe_default() {
        let decision = decide_engines(&ctx(), &EngineOverrides::default(), &FlagSnapshot::new());
        assert_eq!(decision.body_engine, EngineKind::Local);
        assert!(!decision.convert_attachments);
        assert!(decision.reasons.iter().any(|r| r.contains("safe default")));
    }

    #[test]
    fn decision_is_pure_and_deterministic() {
        let flags = FlagSnapshot::new()
            .with_rollout(FLAG_CLOUD_BODY, 42)
            .with_rollout(FLAG_CONVERT_ATTACHMENTS, 42);
        let a = decide_engines(&ctx(), &EngineOverrides::default(), &flags);
        let b = decide_engines(&ctx(), &EngineOverrides::default(), &flags);
        assert_eq!(a.body_engine, b.body_engine);
        assert_eq!(a.convert_attachments, b.convert_attachments);
        assert_eq!(a.reasons, b.reasons);
    }

    #[test]
    fn buckets_are_stable_and_spread() {
        let t = Uuid::parse_str("94a7b7f0-3266-4a4f-9d4e-875542d30e62").unwrap();
        assert_eq!(tenant_bucket(t), tenant_bucket(t));
        assert!(tenant_bucket(t) < 100);

        // A fixed tenant set should not all collapse into one bucket.
        let buckets: std::collections::HashSet<u8> = (0..64u128)
            .map(|i| tenant_bucket(Uuid::from_u128(i)))
            .collect();
        assert!(buckets.len() > 10, "buckets: {buckets:?}");
    }

    #[test]
    fn attachment_override_enables_conversion() {
        let overrides = EngineOverrides {
            body_engine: None,
            convert_attachments: Some(true),
        };
        let decision = decide_engines(&ctx(), &overrides, &FlagSnapshot::new());
        assert!(decision.convert_attachments);
    }
}
