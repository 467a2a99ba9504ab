//! Expansion of directives into task plans

use tracing::{info, warn};

use crate::directive::{Directive, TaskPlan};
use crate::version::error::ResolutionError;
use crate::version::resolution::ResolutionService;

/// Outcome of planning: what to run, and which directives could not be resolved
#[derive(Debug, Default)]
pub struct Planning {
    pub plans: Vec<TaskPlan>,
    pub failures: Vec<ResolutionFailure>,
}

/// A directive that could not be turned into plans
#[derive(Debug)]
pub struct ResolutionFailure {
    pub directive: Directive,
    pub error: ResolutionError,
}

impl Planning {
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty() && self.failures.is_empty()
    }
}

/// Expands directives into plans, in directive order
///
/// For each directive: one plan for a runtime-only directive, otherwise one
/// plan per resolved artifact, followed by the plans of its inverse
/// directives when it asserts inverse. Plans are not de-duplicated.
pub struct TaskPlanner<'a> {
    resolution: &'a dyn ResolutionService,
}

impl<'a> TaskPlanner<'a> {
    pub fn new(resolution: &'a dyn ResolutionService) -> Self {
        Self { resolution }
    }

    pub async fn plan(&self, directives: &[Directive]) -> Planning {
        let mut planning = Planning::default();

        for directive in directives {
            if directive.is_runtime_only() {
                planning.plans.push(TaskPlan::new(directive.clone(), None));
                continue;
            }

            self.plan_artifacts(directive, &mut planning).await;

            if directive.assert_inverse() {
                match self.resolution.inverse_of(directive).await {
                    Ok(inverses) => {
                        for inverse in &inverses {
                            self.plan_artifacts(inverse, &mut planning).await;
                        }
                    }
                    Err(error) => Self::record(&mut planning, directive, error),
                }
            }
        }

        info!(
            "Planned {} tasks from {} directives ({} unresolved)",
            planning.plans.len(),
            directives.len(),
            planning.failures.len()
        );
        planning
    }

    async fn plan_artifacts(&self, directive: &Directive, planning: &mut Planning) {
        match self.resolution.resolve(directive).await {
            Ok(artifacts) => planning.plans.extend(
                artifacts
                    .into_iter()
                    .map(|artifact| TaskPlan::new(directive.clone(), Some(artifact))),
            ),
            Err(error) => Self::record(planning, directive, error),
        }
    }

    fn record(planning: &mut Planning, directive: &Directive, error: ResolutionError) {
        warn!("{}", error);
        planning.failures.push(ResolutionFailure {
            directive: directive.clone(),
            error,
        });
    }
}
