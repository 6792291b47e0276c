//! Onboarding wizard step-completion contract.
//!
//! Only the completion contract lives here: which steps a role's wizard
//! has, which are done, and whether the wizard as a whole is complete.
//! Field-level validation inside each step belongs to the form layer and
//! is out of scope for this core.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::ActorRole;

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

/// Wizard steps for a worker account.
pub const WORKER_STEPS: &[&str] = &["profile", "skills", "portfolio", "rates", "review"];

/// Wizard steps for a company account.
pub const COMPANY_STEPS: &[&str] = &["profile", "company_details", "billing", "review"];

/// The ordered step list for a role. Admins have no wizard.
pub fn steps_for_role(role: ActorRole) -> &'static [&'static str] {
    match role {
        ActorRole::Worker => WORKER_STEPS,
        ActorRole::Company => COMPANY_STEPS,
        ActorRole::Admin => &[],
    }
}

// ---------------------------------------------------------------------------
// Progress tracking
// ---------------------------------------------------------------------------

/// Completion state of one user's onboarding wizard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnboardingProgress {
    pub role: ActorRole,
    /// Completed step names, in completion order.
    completed: Vec<String>,
}

impl OnboardingProgress {
    pub fn new(role: ActorRole) -> Self {
        Self {
            role,
            completed: Vec::new(),
        }
    }

    /// Mark a step complete. Completion is monotonic: re-completing an
    /// already-done step is a no-op, not an error, so step forms can
    /// save freely on every revisit.
    pub fn complete_step(&mut self, step: &str) -> Result<(), CoreError> {
        let steps = steps_for_role(self.role);
        if !steps.contains(&step) {
            return Err(CoreError::Validation(format!(
                "Unknown onboarding step '{step}' for role '{}'. Must be one of: {}",
                self.role.as_str(),
                steps.join(", ")
            )));
        }
        if !self.completed.iter().any(|s| s == step) {
            self.completed.push(step.to_string());
        }
        Ok(())
    }

    pub fn is_step_complete(&self, step: &str) -> bool {
        self.completed.iter().any(|s| s == step)
    }

    /// Completed steps out of the role's total.
    pub fn progress(&self) -> (usize, usize) {
        (self.completed.len(), steps_for_role(self.role).len())
    }

    /// The wizard is complete once every step for the role is done.
    pub fn is_complete(&self) -> bool {
        let (done, total) = self.progress();
        total > 0 && done == total
    }

    /// First step that is not yet complete, in wizard order.
    pub fn next_step(&self) -> Option<&'static str> {
        steps_for_role(self.role)
            .iter()
            .find(|step| !self.is_step_complete(step))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_step_rejected() {
        let mut progress = OnboardingProgress::new(ActorRole::Worker);
        let err = progress.complete_step("billing").unwrap_err();
        assert!(err.to_string().contains("Unknown onboarding step"));
    }

    #[test]
    fn test_completion_is_monotonic() {
        let mut progress = OnboardingProgress::new(ActorRole::Worker);
        progress.complete_step("profile").unwrap();
        progress.complete_step("profile").unwrap();
        assert_eq!(progress.progress(), (1, 5));
    }

    #[test]
    fn test_next_step_follows_wizard_order() {
        let mut progress = OnboardingProgress::new(ActorRole::Company);
        assert_eq!(progress.next_step(), Some("profile"));
        // Completing out of order still reports the earliest gap.
        progress.complete_step("billing").unwrap();
        assert_eq!(progress.next_step(), Some("profile"));
    }

    #[test]
    fn test_wizard_completes_when_all_steps_done() {
        let mut progress = OnboardingProgress::new(ActorRole::Company);
        for step in COMPANY_STEPS {
            assert!(!progress.is_complete());
            progress.complete_step(step).unwrap();
        }
        assert!(progress.is_complete());
        assert_eq!(progress.next_step(), None);
    }

    #[test]
    fn test_admin_has_no_wizard() {
        let progress = OnboardingProgress::new(ActorRole::Admin);
        assert!(!progress.is_complete());
        assert_eq!(progress.next_step(), None);
    }
}
