//! The process-wide "fault injection enabled" flag and the explicit context
//! object an interceptor is built from.
//!
//! SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::FaultParams;
use crate::corruption::CorruptionEngine;
use crate::err::FaultErr;
use crate::injector::FaultInjector;
use crate::rng::Entropy;
use crate::session::HookRegistry;

/// Shared on/off switch owned by an external configuration collaborator. The
/// core only reads it, once per frame decision.
#[derive(Clone, Debug, Default)]
pub struct Policy {
    enabled: Arc<AtomicBool>,
}

impl Policy {
    pub fn new(enabled: bool) -> Self {
        Policy {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}

/// Everything an interceptor needs, passed in explicitly instead of living in
/// globals
#[derive(Clone)]
pub struct InterceptContext {
    pub policy: Policy,
    params: FaultParams,
    pub entropy: Entropy,
    pub hooks: HookRegistry,
}

impl InterceptContext {
    pub fn new(
        policy: Policy,
        params: FaultParams,
        entropy: Entropy,
        hooks: HookRegistry,
    ) -> Result<Self, FaultErr> {
        params.validate()?;

        Ok(InterceptContext {
            policy,
            params,
            entropy,
            hooks,
        })
    }

    /// Context with default thresholds, fresh entropy, and no hooks
    pub fn with_policy(policy: Policy) -> Self {
        InterceptContext {
            policy,
            params: FaultParams::default(),
            entropy: Entropy::from_entropy(),
            hooks: HookRegistry::default(),
        }
    }

    /// Thresholds, validated when the context was built
    pub fn params(&self) -> &FaultParams {
        &self.params
    }

    pub fn injector(&self) -> FaultInjector {
        FaultInjector::new(
            self.params,
            CorruptionEngine::new(&self.params),
            self.policy.clone(),
            self.entropy.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let policy = Policy::new(false);
        let reader = policy.clone();
        policy.set_enabled(true);
        assert!(reader.is_enabled());
    }

    #[test]
    fn context_rejects_bad_params() {
        let params = FaultParams {
            drop_rate: 1.5,
            ..FaultParams::default()
        };
        let ctx = InterceptContext::new(
            Policy::default(),
            params,
            Entropy::seeded(0),
            HookRegistry::default(),
        );
        assert!(ctx.is_err());
    }

    #[test]
    fn context_keeps_validated_params() {
        let params = FaultParams {
            drop_rate: 0.5,
            corrupt_rate: 0.5,
            ..FaultParams::default()
        };
        let ctx = InterceptContext::new(
            Policy::default(),
            params,
            Entropy::seeded(0),
            HookRegistry::default(),
        )
        .unwrap();
        assert_eq!(*ctx.params(), params);
        assert!(ctx.params().validate().is_ok());
    }
}
