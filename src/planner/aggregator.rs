//! Plan aggregation across a stack and its nested stacks.
//!
//! For each stack level the planner dereferences the live ("origin")
//! template once, then repeatedly plans the nested stacks, dereferences the
//! proposed template, diffs the two and buckets every difference. Each pass
//! can raise new taint flags (a replaced resource, a changed nested output),
//! which changes what the next pass resolves to. The loop ends when two
//! consecutive passes produce the same plan.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, trace, warn};

use crate::config::ContentHasher;
use crate::error::{OrchestrationError, PlanError, Result, StackPlanError};
use crate::schema::{EffectClassifier, UpdateCause};
use crate::stack::{OrchestrationClient, StackSnapshot};
use crate::template::{
    Expression, INIT_METADATA_KEY, METADATA_KEY, OUTPUTS_KEY, PROPERTIES_KEY, ParameterSet,
    PseudoParameters, RESOURCES_KEY, TYPE_KEY, Template,
};
use crate::translator::{StackIdentity, Translator, TranslatorArena};

use super::diff::{DiffEngine, DiffEntry, DiffType};
use super::plan::{ImpactBucket, PlanResult};

type PlanFuture<'a> = Pin<Box<dyn Future<Output = Result<PlanResult>> + Send + 'a>>;

/// Planner tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlannerOptions {
    /// Cap on fixed-point passes per stack level.
    ///
    /// Each stack level is bounded by the number of taint flags it can
    /// raise; a cap lowers that bound further.
    pub max_iterations: Option<u32>,
    /// Parameter overrides applied to every stack, above all other sources.
    pub global_parameters: BTreeMap<String, String>,
    /// Nested stack resource types; the client's list when `None`.
    pub stack_types: Option<Vec<String>>,
}

/// Update-impact planner.
#[derive(Debug)]
pub struct Planner<C> {
    /// Orchestration API client.
    client: C,
    /// Effect classifier.
    classifier: EffectClassifier,
    /// Tuning.
    options: PlannerOptions,
    /// Diff engine.
    diff_engine: DiffEngine,
    /// Content hasher.
    hasher: ContentHasher,
}

impl<C: OrchestrationClient> Planner<C> {
    /// Creates a planner with default options.
    #[must_use]
    pub fn new(client: C, classifier: EffectClassifier) -> Self {
        Self {
            client,
            classifier,
            options: PlannerOptions::default(),
            diff_engine: DiffEngine::new(),
            hasher: ContentHasher::new(),
        }
    }

    /// Sets the options (builder style).
    #[must_use]
    pub fn with_options(mut self, options: PlannerOptions) -> Self {
        self.options = options;
        self
    }

    /// Gets the orchestration client.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Gets the options.
    #[must_use]
    pub const fn options(&self) -> &PlannerOptions {
        &self.options
    }

    /// Computes the impact of updating `stack` to `template` and `parameters`.
    ///
    /// Nothing is modified. Parameters not given keep their live values.
    ///
    /// # Errors
    ///
    /// Returns an error if a nested stack cannot be fetched, a template
    /// cannot be evaluated, or the plan does not converge.
    pub async fn generate_plan(
        &self,
        stack: &StackSnapshot,
        template: &Template,
        parameters: &ParameterSet,
    ) -> Result<PlanResult> {
        info!("Planning update of stack {}", stack.name);

        let mut arena = TranslatorArena::new();
        let plan = self
            .plan_stack(&mut arena, stack, template, parameters, stack.name.clone())
            .await?;

        info!(
            "Plan for {} complete: {} resources affected across {} translators",
            stack.name,
            plan.impact_count(),
            arena.len()
        );
        Ok(plan)
    }

    fn stack_types(&self) -> Vec<String> {
        self.options
            .stack_types
            .clone()
            .unwrap_or_else(|| self.client.stack_types().to_vec())
    }

    /// Plans one stack level, recursing into nested stacks present on both sides.
    fn plan_stack<'a>(
        &'a self,
        arena: &'a mut TranslatorArena,
        stack: &'a StackSnapshot,
        template: &'a Template,
        parameters: &'a ParameterSet,
        path: String,
    ) -> PlanFuture<'a> {
        Box::pin(async move {
            let stack_types = self.stack_types();
            let checksum = self.stack_checksum(stack)?;
            let origin_id = StackIdentity::origin(&checksum);
            let proposed_id = StackIdentity::proposed(&checksum, &path);
            debug!("Planning {path} as {proposed_id}");

            let pseudo = self.pseudo_parameters(stack).await?;
            let global = &self.options.global_parameters;
            let live = stack.parameter_set();

            let origin_doc = arena
                .bind(&origin_id, &stack.template, live.with_pseudo(&pseudo, global))?
                .dereference_template(&stack.template, &stack_types)?;
            arena.bind(
                &proposed_id,
                template,
                live.merged(parameters).with_pseudo(&pseudo, global),
            )?;

            let nested = self.fetch_nested(stack, template, &stack_types).await?;
            let max_passes = self.pass_bound(template, &nested)?;

            let mut previous: Option<String> = None;
            for iteration in 1..=max_passes {
                trace!("{path}: pass {iteration}");
                let mut plan = PlanResult::new();

                for (logical_id, child) in &nested {
                    let (child_template, child_parameters) =
                        Self::nested_inputs(arena.get_mut(&proposed_id), template, logical_id, child)?;
                    let child_plan = self
                        .plan_stack(
                            arena,
                            child,
                            &child_template,
                            &child_parameters,
                            format!("{path}/{logical_id}"),
                        )
                        .await?;

                    let translator = arena.get_mut(&proposed_id);
                    for output in child_plan.outputs.keys() {
                        translator.flag_ref(Translator::output_flag(logical_id, output));
                    }
                    plan.stacks.insert(logical_id.clone(), child_plan);
                }

                let translator = arena.get_mut(&proposed_id);
                let proposed_doc = translator.dereference_template(template, &stack_types)?;
                for diff in self.diff_engine.compute_diff(&origin_doc, &proposed_doc) {
                    self.register_diff(&mut plan, translator, &origin_doc, &proposed_doc, diff);
                }

                let checksum = plan.checksum()?;
                if previous.as_deref() == Some(checksum.as_str()) {
                    plan.check_conflicts(&stack.name)?;
                    plan.scrub();
                    debug!("{path} converged after {iteration} passes");
                    return Ok(plan);
                }
                previous = Some(checksum);
            }

            warn!("{path} did not converge within {max_passes} passes");
            Err(PlanError::NonConvergent {
                stack: stack.name.clone(),
                iterations: max_passes,
            }
            .into())
        })
    }

    /// Content checksum of a live stack, keying its translators.
    fn stack_checksum(&self, stack: &StackSnapshot) -> Result<String> {
        self.hasher.hash_value(&(&stack.id, &stack.template))
    }

    /// Bound on fixed-point passes for one stack level.
    ///
    /// A pass that raises no new flag reproduces the previous plan, so the
    /// loop needs at most one pass per possible flag (a resource name or a
    /// nested output) plus two to confirm the fixed point.
    fn pass_bound(&self, template: &Template, nested: &[(String, StackSnapshot)]) -> Result<u32> {
        let mut flags = template.resources.len() + template.outputs.len();
        for (logical_id, child) in nested {
            flags += child.template.outputs.len();
            if let Some(embedded) = template
                .resources
                .get(logical_id)
                .map(|r| r.nested_template())
                .transpose()?
                .flatten()
            {
                flags += embedded.outputs.len();
            }
        }

        let derived = u32::try_from(flags).unwrap_or(u32::MAX).saturating_add(2);
        Ok(self
            .options
            .max_iterations
            .map_or(derived, |cap| cap.min(derived)))
    }

    async fn pseudo_parameters(&self, stack: &StackSnapshot) -> Result<PseudoParameters> {
        let account_id = match PseudoParameters::account_from_stack_id(&stack.id) {
            Some(account_id) => account_id,
            None => self.client.account_id().await?,
        };

        Ok(PseudoParameters {
            region: self.client.region().to_string(),
            account_id,
            stack_id: stack.id.clone(),
            stack_name: stack.name.clone(),
            notification_topics: stack.notification_topics.clone(),
        })
    }

    /// Fetches the live nested stacks declared in both templates.
    async fn fetch_nested(
        &self,
        stack: &StackSnapshot,
        template: &Template,
        stack_types: &[String],
    ) -> Result<Vec<(String, StackSnapshot)>> {
        let proposed = template.nested_stack_names(stack_types);
        let mut nested = Vec::new();

        for logical_id in stack.template.nested_stack_names(stack_types) {
            if !proposed.contains(&logical_id) {
                continue;
            }
            let name = stack.nested_stack_name(logical_id).ok_or_else(|| {
                StackPlanError::from(OrchestrationError::stack_not_found(format!(
                    "{}/{logical_id}",
                    stack.name
                )))
            })?;
            debug!("Fetching nested stack {name} ({logical_id})");
            let child = self.client.fetch_stack(name).await?;
            nested.push((logical_id.to_string(), child));
        }

        Ok(nested)
    }

    /// Proposed template and parameters for a nested stack.
    ///
    /// Parameter values are dereferenced with the parent translator; values
    /// that still hold unresolved functions fall back to the live value.
    fn nested_inputs(
        parent: &Translator,
        template: &Template,
        logical_id: &str,
        child: &StackSnapshot,
    ) -> Result<(Template, ParameterSet)> {
        let resource = template.resources.get(logical_id).ok_or_else(|| {
            StackPlanError::internal(format!("Nested stack {logical_id} missing from template"))
        })?;

        let child_template = resource
            .nested_template()?
            .unwrap_or_else(|| child.template.clone());

        let mut parameters = ParameterSet::new();
        for (name, expr) in resource.nested_parameters() {
            let value = parent.dereference(&expr)?;
            let value = if value.is_literal() || value.contains_runtime_modified() {
                value
            } else if let Some(live) = child.parameters.get(&name) {
                trace!("Parameter {name} of {logical_id} unresolved, using live value");
                Expression::String(live.clone())
            } else {
                value
            };
            parameters.insert(name, value);
        }

        Ok((child_template, parameters))
    }

    /// Buckets one difference.
    fn register_diff(
        &self,
        plan: &mut PlanResult,
        translator: &mut Translator,
        origin: &Expression,
        proposed: &Expression,
        diff: DiffEntry,
    ) {
        match diff.segment(0) {
            Some(RESOURCES_KEY) => self.register_resource_diff(plan, translator, origin, proposed, diff),
            Some(OUTPUTS_KEY) => {
                if let Some(name) = diff.segment(1).map(String::from) {
                    plan.set_output(&name, diff);
                }
            }
            _ => trace!("Ignoring diff {diff}"),
        }
    }

    fn register_resource_diff(
        &self,
        plan: &mut PlanResult,
        translator: &mut Translator,
        origin: &Expression,
        proposed: &Expression,
        diff: DiffEntry,
    ) {
        let Some(name) = diff.segment(1).map(String::from) else {
            return;
        };
        let origin_resource = origin.get_path(&[RESOURCES_KEY, name.as_str()]);
        let proposed_resource = proposed.get_path(&[RESOURCES_KEY, name.as_str()]);
        let resource_type = proposed_resource
            .or(origin_resource)
            .and_then(|r| r.get_path(&[TYPE_KEY]))
            .and_then(Expression::as_str)
            .unwrap_or_default()
            .to_string();

        if diff.depth() == 2 {
            match diff.kind {
                DiffType::Added => plan.set_resource(ImpactBucket::Added, &name, &resource_type, None, diff),
                DiffType::Removed => plan.set_resource(ImpactBucket::Removed, &name, &resource_type, None, diff),
                DiffType::Changed => trace!("Ignoring non-map resource change {diff}"),
            }
            return;
        }

        let (cause, property) = match (diff.segment(2), diff.segment(3)) {
            (Some(TYPE_KEY), _) => (Some(UpdateCause::Replacement), TYPE_KEY.to_string()),
            (Some(PROPERTIES_KEY), Some(property)) => {
                let cause = self.classifier.classify(
                    &resource_type,
                    property,
                    proposed_resource.unwrap_or(&Expression::Null),
                    origin_resource.unwrap_or(&Expression::Null),
                );
                (Some(cause), property.to_string())
            }
            (Some(METADATA_KEY), Some(INIT_METADATA_KEY)) => (
                self.classifier.classify_init(&resource_type),
                INIT_METADATA_KEY.to_string(),
            ),
            _ => {
                trace!("Ignoring diff {diff}");
                return;
            }
        };

        let Some(bucket) = cause.and_then(ImpactBucket::for_cause) else {
            trace!("{name}.{property} change has no effect");
            return;
        };

        if matches!(bucket, ImpactBucket::Replace | ImpactBucket::Interrupt) {
            translator.flag_ref(name.clone());
        }
        debug!("{name} ({resource_type}) {bucket} via {property}");
        plan.set_resource(bucket, &name, &resource_type, Some(&property), diff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use crate::template::ResourceDef;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct NoStacks {
        stack_types: Vec<String>,
    }

    #[async_trait]
    impl OrchestrationClient for NoStacks {
        async fn fetch_stack(&self, name: &str) -> Result<StackSnapshot> {
            Err(OrchestrationError::stack_not_found(name).into())
        }

        async fn account_id(&self) -> Result<String> {
            Ok(String::from("123456789012"))
        }

        fn region(&self) -> &str {
            "us-east-1"
        }

        fn stack_types(&self) -> &[String] {
            &self.stack_types
        }

        fn backend_type(&self) -> &'static str {
            "none"
        }
    }

    fn planner() -> Planner<NoStacks> {
        Planner::new(
            NoStacks {
                stack_types: vec![String::from("AWS::CloudFormation::Stack")],
            },
            EffectClassifier::new(Arc::new(SchemaRegistry::builtin())),
        )
    }

    fn instance(image: &str) -> ResourceDef {
        ResourceDef::new("AWS::EC2::Instance").with_property("ImageId", image)
    }

    fn template(resources: Vec<(&str, ResourceDef)>) -> Template {
        Template {
            resources: resources
                .into_iter()
                .map(|(name, r)| (name.to_string(), r))
                .collect(),
            ..Template::default()
        }
    }

    #[tokio::test]
    async fn test_replacement_flags_dependents() {
        let origin = template(vec![
            ("Web", instance("ami-1")),
            (
                "Ip",
                ResourceDef::new("AWS::EC2::EIP")
                    .with_property("InstanceId", Expression::reference("Web")),
            ),
        ]);
        let mut proposed = origin.clone();
        proposed.resources.insert(String::from("Web"), instance("ami-2"));

        let stack = StackSnapshot::new("app-id", "app", origin);
        let plan = planner()
            .generate_plan(&stack, &proposed, &ParameterSet::new())
            .await
            .expect("plan");

        assert!(plan.replace.contains_key("Web"));
        // InstanceId has no update effect on an EIP
        assert!(plan.buckets_of("Ip").is_empty());
    }

    #[tokio::test]
    async fn test_type_change_is_replacement() {
        let origin = template(vec![("Queue", ResourceDef::new("AWS::SQS::Queue"))]);
        let proposed = template(vec![("Queue", ResourceDef::new("AWS::SNS::Topic"))]);

        let stack = StackSnapshot::new("app-id", "app", origin);
        let plan = planner()
            .generate_plan(&stack, &proposed, &ParameterSet::new())
            .await
            .expect("plan");

        let impact = &plan.replace["Queue"];
        assert!(impact.properties.contains(TYPE_KEY));
        assert_eq!(impact.resource_type, "AWS::SNS::Topic");
    }

    #[tokio::test]
    async fn test_init_metadata_allow_list() {
        let with_init = |types: &str, config: &str| {
            let mut resource = ResourceDef::new(types);
            resource.metadata.insert(
                INIT_METADATA_KEY.to_string(),
                Expression::from(json!({"config": {"commands": {"run": {"command": config}}}})),
            );
            resource
        };
        let origin = template(vec![
            ("Web", with_init("AWS::EC2::Instance", "echo a")),
            ("Group", with_init("AWS::AutoScaling::AutoScalingGroup", "echo a")),
        ]);
        let proposed = template(vec![
            ("Web", with_init("AWS::EC2::Instance", "echo b")),
            ("Group", with_init("AWS::AutoScaling::AutoScalingGroup", "echo b")),
        ]);

        let stack = StackSnapshot::new("app-id", "app", origin);
        let plan = planner()
            .generate_plan(&stack, &proposed, &ParameterSet::new())
            .await
            .expect("plan");

        assert!(plan.replace["Web"].properties.contains(INIT_METADATA_KEY));
        assert!(plan.buckets_of("Group").is_empty());
    }

    #[tokio::test]
    async fn test_iteration_bound_enforced() {
        let origin = template(vec![("Web", instance("ami-1"))]);
        let proposed = template(vec![("Web", instance("ami-2"))]);
        let stack = StackSnapshot::new("app-id", "app", origin);

        let planner = planner().with_options(PlannerOptions {
            max_iterations: Some(1),
            ..PlannerOptions::default()
        });
        let err = planner
            .generate_plan(&stack, &proposed, &ParameterSet::new())
            .await
            .expect_err("one pass cannot confirm a fixed point");
        assert!(matches!(
            err,
            StackPlanError::Plan(PlanError::NonConvergent { iterations: 1, .. })
        ));
    }

    #[test]
    fn test_pass_bound_follows_flag_count() {
        let proposed = template(vec![("Web", instance("ami-1")), ("Db", instance("ami-1"))]);

        // Two resources can raise two flags
        assert_eq!(planner().pass_bound(&proposed, &[]).expect("bound"), 4);

        let capped = planner().with_options(PlannerOptions {
            max_iterations: Some(3),
            ..PlannerOptions::default()
        });
        assert_eq!(capped.pass_bound(&proposed, &[]).expect("bound"), 3);

        let loose = planner().with_options(PlannerOptions {
            max_iterations: Some(50),
            ..PlannerOptions::default()
        });
        assert_eq!(loose.pass_bound(&proposed, &[]).expect("bound"), 4);
    }

    #[test]
    fn test_stack_checksum_tracks_template() {
        let planner = planner();
        let first = StackSnapshot::new("app-id", "app", template(vec![("Web", instance("ami-1"))]));
        let second = StackSnapshot::new("app-id", "app", template(vec![("Web", instance("ami-2"))]));

        assert_eq!(
            planner.stack_checksum(&first).expect("checksum"),
            planner.stack_checksum(&first.clone()).expect("checksum")
        );
        assert_ne!(
            planner.stack_checksum(&first).expect("checksum"),
            planner.stack_checksum(&second).expect("checksum")
        );
    }

    #[tokio::test]
    async fn test_global_parameters_override() {
        let mut origin = template(vec![(
            "Web",
            ResourceDef::new("AWS::EC2::Instance").with_property("ImageId", Expression::reference("Ami")),
        )]);
        origin.parameters.insert(
            String::from("Ami"),
            serde_json::from_value(json!({"Type": "String"})).expect("param"),
        );
        let stack = StackSnapshot::new("app-id", "app", origin.clone()).with_parameter("Ami", "ami-1");

        let mut global = BTreeMap::new();
        global.insert(String::from("Ami"), String::from("ami-pinned"));
        let planner = planner().with_options(PlannerOptions {
            global_parameters: global,
            ..PlannerOptions::default()
        });

        // The override wins over both the live and the proposed value
        let plan = planner
            .generate_plan(&stack, &origin, &ParameterSet::from_strings([("Ami", "ami-2")]))
            .await
            .expect("plan");
        assert!(plan.is_empty());
    }
}
