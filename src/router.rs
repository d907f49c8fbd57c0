//! Pipeline router: turns a validated request into a [`ConversionPlan`].
//!
//! ## Algorithm
//!
//! 1. If no adapter reads the input extension at all, fail with
//!    [`RoutingError::UnsupportedInput`].
//! 2. If an adapter converts `from → to` directly in the declared domain,
//!    the plan is that single stage.
//! 3. Otherwise pick a normalization target for the input (PDF, for
//!    documents, images, PDFs, and anything in the `pdf` domain) and plan
//!    `[from → pdf]` followed by the plan for `pdf → to`.
//!
//! The normalization leg runs in the input's home family (`docx` is
//! converted to PDF by whatever serves the `document` domain); everything
//! after it runs in the declared domain, which stays authoritative.
//!
//! Plans never exceed [`MAX_PLAN_STAGES`]. A normalization target equal to
//! the input or the requested output would revisit a format and is
//! rejected as [`RoutingError::Cycle`] instead of being expanded again.

use crate::adapters::{Adapter, AdapterSet};
use crate::error::RoutingError;
use crate::formats::{self, Domain};
use crate::request::ConversionRequest;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Hard cap on stages in one plan.
pub const MAX_PLAN_STAGES: usize = 2;

/// Format every normalizable input is converted to first.
pub const NORMALIZATION_TARGET: &str = "pdf";

/// One adapter invocation within a plan.
#[derive(Clone)]
pub struct Stage {
    pub domain: Domain,
    pub source_extension: String,
    pub dest_extension: String,
    pub adapter: Arc<dyn Adapter>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("domain", &self.domain)
            .field("source_extension", &self.source_extension)
            .field("dest_extension", &self.dest_extension)
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} → {} ({}, {})",
            self.source_extension,
            self.dest_extension,
            self.domain,
            self.adapter.name()
        )
    }
}

/// Ordered stages routing an input extension to a target extension.
///
/// Invariant: stage *i*'s destination is stage *i+1*'s source and the last
/// destination is the requested target.
#[derive(Debug, Clone)]
pub struct ConversionPlan {
    domain: Domain,
    stages: Vec<Stage>,
}

impl ConversionPlan {
    /// The declared domain the plan serves.
    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_direct(&self) -> bool {
        self.stages.len() == 1
    }

    pub fn source_extension(&self) -> &str {
        self.stages
            .first()
            .map(|s| s.source_extension.as_str())
            .unwrap_or_default()
    }

    pub fn target_extension(&self) -> &str {
        self.stages
            .last()
            .map(|s| s.dest_extension.as_str())
            .unwrap_or_default()
    }

    /// Whether consecutive stages hand off the same extension.
    pub fn is_chained(&self) -> bool {
        self.stages
            .windows(2)
            .all(|w| w[0].dest_extension == w[1].source_extension)
    }

    /// One line per stage, for logs and the CLI.
    pub fn summary(&self) -> Vec<String> {
        self.stages.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ConversionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_extension())?;
        for stage in &self.stages {
            write!(f, " → {} [{}]", stage.dest_extension, stage.adapter.name())?;
        }
        Ok(())
    }
}

/// Builds plans from the registered adapters. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Router {
    adapters: AdapterSet,
    max_stages: usize,
}

impl Router {
    pub fn new(adapters: AdapterSet) -> Self {
        Self {
            adapters,
            max_stages: MAX_PLAN_STAGES,
        }
    }

    /// Lower the stage cap (clamped to `1..=MAX_PLAN_STAGES`).
    pub fn with_max_stages(mut self, n: usize) -> Self {
        self.max_stages = n.clamp(1, MAX_PLAN_STAGES);
        self
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    /// Plan a validated request.
    pub fn plan(&self, request: &ConversionRequest) -> Result<ConversionPlan, RoutingError> {
        self.plan_for(
            request.domain,
            &request.input_extension,
            &request.target_extension,
        )
    }

    /// Plan `from → to` in `domain`. Extensions must be lower-case.
    pub fn plan_for(
        &self,
        domain: Domain,
        from: &str,
        to: &str,
    ) -> Result<ConversionPlan, RoutingError> {
        if !self.adapters.accepts_input(from) {
            return Err(RoutingError::UnsupportedInput {
                extension: from.to_string(),
            });
        }

        let stages = self.route(domain, from, to, self.max_stages)?;
        let plan = ConversionPlan { domain, stages };
        debug_assert!(plan.is_chained());
        debug!(%domain, from, to, plan = %plan, "Planned conversion");
        Ok(plan)
    }

    fn route(
        &self,
        domain: Domain,
        from: &str,
        to: &str,
        budget: usize,
    ) -> Result<Vec<Stage>, RoutingError> {
        if let Some(adapter) = self.adapters.find(domain, from, to) {
            return Ok(vec![stage(domain, from, to, adapter)]);
        }

        let via = normalization_target(domain, from).ok_or_else(|| RoutingError::NoRoute {
            domain,
            from: from.to_string(),
            to: to.to_string(),
        })?;

        if via == from || via == to {
            return Err(RoutingError::Cycle {
                domain,
                from: from.to_string(),
                to: to.to_string(),
                via: via.to_string(),
            });
        }
        if budget < 2 {
            return Err(RoutingError::HopLimit {
                from: from.to_string(),
                to: to.to_string(),
                max: self.max_stages,
            });
        }

        let leg_domain = formats::domain_for(from).unwrap_or(domain);
        let (leg_domain, first) = self
            .adapters
            .find(leg_domain, from, via)
            .map(|a| (leg_domain, a))
            .or_else(|| self.adapters.find(domain, from, via).map(|a| (domain, a)))
            .ok_or_else(|| RoutingError::NoRoute {
                domain: leg_domain,
                from: from.to_string(),
                to: via.to_string(),
            })?;

        let mut stages = vec![stage(leg_domain, from, via, first)];
        stages.extend(self.route(domain, via, to, budget - 1)?);
        Ok(stages)
    }
}

fn stage(domain: Domain, from: &str, to: &str, adapter: Arc<dyn Adapter>) -> Stage {
    Stage {
        domain,
        source_extension: from.to_string(),
        dest_extension: to.to_string(),
        adapter,
    }
}

/// Intermediate format for inputs with no direct route, if any.
fn normalization_target(domain: Domain, from: &str) -> Option<&'static str> {
    let normalizable = matches!(
        formats::domain_for(from),
        Some(Domain::Document | Domain::Image | Domain::Pdf)
    );
    (domain == Domain::Pdf || normalizable).then_some(NORMALIZATION_TARGET)
}
