//! Orchestration of a full indexing run.
//!
//! Each module is scanned on its own worker task. Workers are bounded by a
//! semaphore, and the blocking front-end work runs on tokio's blocking pool.
//! Aggregation starts only after every dispatched worker has reached a
//! terminal state, and records are then merged by a single writer in module
//! order.

use crate::aggregate::{Aggregator, DuplicatePolicy};
use crate::config::Config;
use crate::error::{CoordinatorError, FrontEndError};
use crate::frontend::{Contracts, ModuleProvider};
use crate::model::{Module, ModuleDescriptor, ModuleId, ReportModel};
use crate::scanner::{ModuleScan, ModuleScanner};
use futures::future::join_all;
use indicatif::ProgressBar;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
    Aggregating,
    Done,
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Maximum number of modules scanned at once.
    pub workers: usize,
    /// Per-module limit; an expired module is abandoned.
    pub timeout: Option<Duration>,
    pub duplicate_policy: DuplicatePolicy,
    pub core_display_name: String,
    pub contracts: Contracts,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl CoordinatorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: pool_size(
                config.workers,
                config.workers_per_core,
                config.resource_constrained,
            ),
            timeout: config.module_timeout_secs.map(Duration::from_secs),
            duplicate_policy: config.on_duplicate_definition,
            core_display_name: config.core_display_name.clone(),
            contracts: config.contracts(),
        }
    }
}

/// Worker pool size: an explicit count wins, otherwise a multiple of the
/// available hardware parallelism. Resource-constrained runs use one worker.
pub fn pool_size(explicit: Option<usize>, per_core: usize, resource_constrained: bool) -> usize {
    if resource_constrained {
        return 1;
    }
    if let Some(n) = explicit {
        return n.max(1);
    }
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores * per_core).max(1)
}

/// Keeps the core module plus either the plugins named in `only` (by
/// artifact id) or, when `only` is empty, every plugin not listed in `skip`.
pub fn select_modules(
    descriptors: Vec<ModuleDescriptor>,
    only: &[String],
    skip: &[String],
) -> Vec<ModuleDescriptor> {
    descriptors
        .into_iter()
        .filter(|d| {
            if d.is_core() {
                return true;
            }
            let artifact = d.artifact_id().unwrap_or_default();
            let keep = if only.is_empty() {
                !skip.contains(&artifact)
            } else {
                only.contains(&artifact)
            };
            if !keep {
                debug!("Skipping module {}", d.gav);
            }
            keep
        })
        .collect()
}

/// Terminal state of one module's unit of work.
#[derive(Debug)]
enum Outcome {
    Scanned(ModuleScan),
    OpenFailed(FrontEndError),
    Panicked(String),
    TimedOut(Duration),
}

impl Outcome {
    fn from_join(joined: Result<Result<ModuleScan, FrontEndError>, JoinError>) -> Self {
        match joined {
            Ok(Ok(scan)) => Outcome::Scanned(scan),
            Ok(Err(e)) => Outcome::OpenFailed(e),
            Err(e) => Outcome::Panicked(e.to_string()),
        }
    }
}

pub struct ScanCoordinator {
    provider: Arc<dyn ModuleProvider>,
    options: CoordinatorOptions,
    phase: Phase,
    progress: Option<Arc<ProgressBar>>,
}

impl ScanCoordinator {
    pub fn new(provider: Arc<dyn ModuleProvider>, options: CoordinatorOptions) -> Self {
        Self {
            provider,
            options,
            phase: Phase::Idle,
            progress: None,
        }
    }

    /// Advances `progress` by one per finished module.
    pub fn with_progress(mut self, progress: Arc<ProgressBar>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Scans every module and aggregates the results.
    ///
    /// Module-level failures end up in the report's failure list. Only
    /// coordinator breakdowns and aggregate consistency violations are
    /// returned as errors. A coordinator runs once.
    pub async fn run(
        &mut self,
        descriptors: Vec<ModuleDescriptor>,
    ) -> Result<ReportModel, CoordinatorError> {
        if self.phase != Phase::Idle {
            return Err(CoordinatorError::AlreadyStarted);
        }

        let mut modules = Vec::with_capacity(descriptors.len());
        let mut work = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let id = ModuleId(modules.len());
            match Module::new(id, &descriptor, &self.options.core_display_name) {
                Ok(module) => {
                    modules.push(module);
                    work.push((id, descriptor));
                }
                Err(e) => warn!("Skipping module: {}", e),
            }
        }

        self.phase = Phase::Scanning;
        info!(
            "Scanning {} modules with {} workers",
            work.len(),
            self.options.workers
        );
        let outcomes = self.scan_all(work).await;
        let outcomes = match outcomes {
            Ok(outcomes) => outcomes,
            Err(e) => {
                self.phase = Phase::Done;
                return Err(e);
            }
        };

        self.phase = Phase::Aggregating;
        let result = self.aggregate(modules, outcomes);
        self.phase = Phase::Done;
        result
    }

    async fn scan_all(
        &self,
        work: Vec<(ModuleId, ModuleDescriptor)>,
    ) -> Result<Vec<(ModuleId, Outcome)>, CoordinatorError> {
        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut handles = Vec::with_capacity(work.len());
        let mut names = Vec::with_capacity(work.len());

        for (id, descriptor) in work {
            let semaphore = Arc::clone(&semaphore);
            let provider = Arc::clone(&self.provider);
            let progress = self.progress.clone();
            let timeout = self.options.timeout;
            let contracts = self.options.contracts.clone();
            names.push((id, descriptor.gav.clone()));

            handles.push(tokio::spawn(async move {
                let permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| CoordinatorError::PoolClosed)?;
                let gav = descriptor.gav.clone();
                debug!("Scanning {}", gav);

                // The permit lives as long as the blocking work, so a timed-out
                // scan still occupies its slot until it has actually stopped.
                let cancel = Arc::new(AtomicBool::new(false));
                let flag = Arc::clone(&cancel);
                let task = tokio::task::spawn_blocking(move || -> Result<ModuleScan, FrontEndError> {
                    let _permit = permit;
                    let front = provider.open(&descriptor)?;
                    Ok(ModuleScanner::new(front.as_ref(), id)
                        .with_contracts(contracts)
                        .with_cancel(flag)
                        .scan())
                });
                let outcome = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, task).await {
                        Ok(joined) => Outcome::from_join(joined),
                        Err(_) => {
                            warn!("Module {} timed out after {:?}, cancelling", gav, limit);
                            cancel.store(true, Ordering::Relaxed);
                            Outcome::TimedOut(limit)
                        }
                    },
                    None => Outcome::from_join(task.await),
                };

                debug!("Finished {}", gav);
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                Ok::<_, CoordinatorError>(outcome)
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for ((id, gav), joined) in names.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(outcome) => outcomes.push((id, outcome?)),
                Err(e) => {
                    return Err(CoordinatorError::WorkerLost {
                        module: gav,
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok(outcomes)
    }

    fn aggregate(
        &self,
        modules: Vec<Module>,
        mut outcomes: Vec<(ModuleId, Outcome)>,
    ) -> Result<ReportModel, CoordinatorError> {
        outcomes.sort_by_key(|(id, _)| *id);
        let mut aggregator = Aggregator::new(modules, self.options.duplicate_policy);

        for (id, outcome) in outcomes {
            match outcome {
                Outcome::Scanned(scan) => aggregator.merge(scan)?,
                Outcome::OpenFailed(e) => aggregator.record_failure(id, format!("failed: {}", e)),
                Outcome::Panicked(reason) => {
                    aggregator.record_failure(id, format!("panicked: {}", reason))
                }
                Outcome::TimedOut(limit) => aggregator
                    .record_failure(id, format!("timed out after {}s", limit.as_secs_f64())),
            }
        }

        let report = aggregator.finish();
        info!(
            "Indexed {} extension points, {} implementations, {} actions",
            report.defined_extension_points().count(),
            report.implementation_count(),
            report.action_count()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AggregateError;
    use crate::frontend::fixture::{FixtureWorkspace, WorkspaceFixture};
    use crate::frontend::{CompilationUnit, Contracts, FrontEnd, ResolvedType, TypeHandle};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn fixture() -> WorkspaceFixture {
        serde_json::from_value(json!({
            "library": [{
                "path": "ExtensionPoint.java",
                "package": "hudson",
                "types": [{ "name": "ExtensionPoint" }]
            }, {
                "path": "Action.java",
                "package": "hudson.model",
                "types": [{ "name": "Action" }]
            }],
            "core": {
                "gav": "org.jenkins-ci.main:jenkins-core:2.400",
                "title": "Jenkins Core",
                "units": [{
                    "path": "Builder.java",
                    "package": "hudson.tasks",
                    "types": [{ "name": "Builder", "interfaces": ["hudson.ExtensionPoint"] }]
                }]
            },
            "plugins": [
                {
                    "gav": "org.example:zeta:1.0",
                    "title": "Zeta plugin",
                    "units": [{
                        "path": "ZetaBuilder.java",
                        "package": "org.zeta",
                        "types": [{ "name": "ZetaBuilder", "superclass": "hudson.tasks.Builder" }]
                    }],
                    "views": { "org.zeta.ZetaBuilder": ["src/main/resources/org/zeta/ZetaBuilder/config.jelly"] }
                },
                {
                    "gav": "org.example:alpha:1.0",
                    "title": "Jenkins Alpha Plugin",
                    "units": [{
                        "path": "AlphaBuilder.java",
                        "package": "org.alpha",
                        "types": [
                            { "name": "AlphaBuilder", "superclass": "hudson.tasks.Builder" },
                            { "name": "AlphaAction", "interfaces": ["hudson.model.Action"] }
                        ]
                    }]
                },
                { "gav": "org.example:broken:1.0", "title": "Broken", "failure": "out of memory" }
            ]
        }))
        .unwrap()
    }

    fn workspace() -> Arc<FixtureWorkspace> {
        Arc::new(FixtureWorkspace::new(fixture(), &Contracts::default()))
    }

    fn options(workers: usize) -> CoordinatorOptions {
        CoordinatorOptions {
            workers,
            timeout: None,
            duplicate_policy: DuplicatePolicy::Fail,
            core_display_name: "Jenkins Core".to_string(),
            contracts: Contracts::default(),
        }
    }

    async fn run(workers: usize) -> ReportModel {
        let ws = workspace();
        let descriptors = ws.descriptors();
        let mut coordinator = ScanCoordinator::new(ws, options(workers));
        let report = coordinator.run(descriptors).await.unwrap();
        assert_eq!(coordinator.phase(), Phase::Done);
        report
    }

    #[tokio::test]
    async fn test_full_run() {
        let report = run(4).await;

        let builder = report.family("hudson.tasks.Builder").unwrap();
        assert!(builder.is_defined());
        assert_eq!(builder.short_name.as_deref(), Some("Builder"));
        let impls: Vec<_> = builder
            .implementations
            .iter()
            .map(|s| s.class_name.as_deref().unwrap())
            .collect();
        assert_eq!(impls, vec!["org.alpha.AlphaBuilder", "org.zeta.ZetaBuilder"]);

        let alpha = report.module("org.example:alpha:1.0").unwrap();
        assert_eq!(alpha.display_name, "Alpha Plugin");
        assert_eq!(alpha.actions.len(), 1);
        assert_eq!(alpha.view_score, Some(0.0));

        let zeta = report.module("org.example:zeta:1.0").unwrap();
        assert_eq!(zeta.view_score, Some(1.0));
        assert_eq!(zeta.uses.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_module_does_not_affect_others() {
        let report = run(2).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].gav, "org.example:broken:1.0");
        assert!(report.failures[0].reason.contains("out of memory"));
        assert_eq!(report.artifacts.len(), 4);
        assert_eq!(
            report
                .family("hudson.tasks.Builder")
                .unwrap()
                .implementations
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_result_independent_of_pool_size() {
        let sequential = run(1).await;
        let parallel = run(8).await;
        assert_eq!(sequential.extension_points, parallel.extension_points);
        assert_eq!(sequential.artifacts, parallel.artifacts);
        assert_eq!(sequential.families_by_module, parallel.families_by_module);
    }

    #[tokio::test]
    async fn test_coordinator_runs_once() {
        let ws = workspace();
        let descriptors = ws.descriptors();
        let mut coordinator = ScanCoordinator::new(ws, options(2));
        assert_eq!(coordinator.phase(), Phase::Idle);
        coordinator.run(descriptors.clone()).await.unwrap();

        let err = coordinator.run(descriptors).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_invalid_coordinate_and_unknown_module() {
        let ws = workspace();
        let mut descriptors = ws.descriptors();
        descriptors.push(ModuleDescriptor::plugin("not-a-gav", "", "Bad", None));
        descriptors.push(ModuleDescriptor::plugin("org.example:ghost:1", "", "Ghost", None));

        let mut coordinator = ScanCoordinator::new(ws, options(2));
        let report = coordinator.run(descriptors).await.unwrap();

        assert!(report.module("not-a-gav").is_none());
        let ghost = report.module("org.example:ghost:1").unwrap();
        assert!(ghost.failure.as_deref().unwrap().starts_with("failed:"));
    }

    #[tokio::test]
    async fn test_duplicate_definition_is_fatal() {
        let mut fx = fixture();
        fx.plugins[0].units[0].types[0].interfaces = vec!["hudson.ExtensionPoint".to_string()];
        fx.plugins[1].units[0].package = "org.zeta".to_string();
        fx.plugins[1].units[0].types[0].name = Some("ZetaBuilder".to_string());
        fx.plugins[1].units[0].types[0].interfaces = vec!["hudson.ExtensionPoint".to_string()];
        let ws = Arc::new(FixtureWorkspace::new(fx, &Contracts::default()));
        let descriptors = ws.descriptors();

        let mut coordinator = ScanCoordinator::new(ws, options(2));
        let err = coordinator.run(descriptors).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Aggregate(AggregateError::DuplicateDefinition { .. })
        ));
        assert_eq!(coordinator.phase(), Phase::Done);
    }

    struct Panics;

    impl FrontEnd for Panics {
        fn units(&self) -> Result<Vec<CompilationUnit>, FrontEndError> {
            panic!("parser bug");
        }

        fn resolve(&self, _ty: &TypeHandle) -> Result<Option<ResolvedType>, FrontEndError> {
            Ok(None)
        }

        fn view_resources(&self, _qualified_name: &str) -> Vec<String> {
            Vec::new()
        }
    }

    struct Hangs;

    impl FrontEnd for Hangs {
        fn units(&self) -> Result<Vec<CompilationUnit>, FrontEndError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(Vec::new())
        }

        fn resolve(&self, _ty: &TypeHandle) -> Result<Option<ResolvedType>, FrontEndError> {
            Ok(None)
        }

        fn view_resources(&self, _qualified_name: &str) -> Vec<String> {
            Vec::new()
        }
    }

    /// Serves the fixture workspace but misbehaves for selected modules.
    struct Unreliable {
        inner: FixtureWorkspace,
    }

    #[async_trait]
    impl ModuleProvider for Unreliable {
        fn name(&self) -> &str {
            "unreliable"
        }

        async fn modules(&self) -> anyhow::Result<Vec<ModuleDescriptor>> {
            let mut modules = self.inner.descriptors();
            modules.push(ModuleDescriptor::plugin("org.example:panics:1", "", "Panics", None));
            modules.push(ModuleDescriptor::plugin("org.example:hangs:1", "", "Hangs", None));
            Ok(modules)
        }

        fn open(&self, module: &ModuleDescriptor) -> Result<Box<dyn FrontEnd>, FrontEndError> {
            match module.artifact_id().as_deref() {
                Some("panics") => Ok(Box::new(Panics)),
                Some("hangs") => Ok(Box::new(Hangs)),
                _ => self.inner.open(module),
            }
        }
    }

    #[tokio::test]
    async fn test_panic_and_timeout_are_module_failures() {
        let provider = Arc::new(Unreliable {
            inner: FixtureWorkspace::new(fixture(), &Contracts::default()),
        });
        let descriptors = provider.modules().await.unwrap();

        let mut opts = options(4);
        opts.timeout = Some(Duration::from_millis(100));
        let mut coordinator = ScanCoordinator::new(provider, opts);
        let report = coordinator.run(descriptors).await.unwrap();

        let reason = |gav: &str| report.module(gav).unwrap().failure.clone().unwrap();
        assert!(reason("org.example:panics:1").starts_with("panicked:"));
        assert!(reason("org.example:hangs:1").starts_with("timed out"));
        assert!(report.family("hudson.tasks.Builder").unwrap().is_defined());
        assert_eq!(report.failures.len(), 3);
    }

    /// Front end that tracks how many sessions are analyzing at once.
    struct Tracked {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl FrontEnd for Tracked {
        fn units(&self) -> Result<Vec<CompilationUnit>, FrontEndError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn resolve(&self, _ty: &TypeHandle) -> Result<Option<ResolvedType>, FrontEndError> {
            Ok(None)
        }

        fn view_resources(&self, _qualified_name: &str) -> Vec<String> {
            Vec::new()
        }
    }

    struct SlowModules {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ModuleProvider for SlowModules {
        fn name(&self) -> &str {
            "slow"
        }

        async fn modules(&self) -> anyhow::Result<Vec<ModuleDescriptor>> {
            Ok((0..4)
                .map(|i| ModuleDescriptor::plugin(format!("g:slow{}:1", i), "", "Slow", None))
                .collect())
        }

        fn open(&self, _module: &ModuleDescriptor) -> Result<Box<dyn FrontEnd>, FrontEndError> {
            Ok(Box::new(Tracked {
                active: Arc::clone(&self.active),
                peak: Arc::clone(&self.peak),
            }))
        }
    }

    #[tokio::test]
    async fn test_timed_out_scans_keep_their_worker_slot() {
        let peak = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(SlowModules {
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::clone(&peak),
        });
        let descriptors = provider.modules().await.unwrap();

        let mut opts = options(pool_size(None, 3, true));
        opts.timeout = Some(Duration::from_millis(50));
        let mut coordinator = ScanCoordinator::new(provider, opts);
        let report = coordinator.run(descriptors).await.unwrap();

        assert_eq!(report.failures.len(), 4);
        assert!(report
            .failures
            .iter()
            .all(|f| f.reason.starts_with("timed out")));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_select_modules() {
        let descriptors = vec![
            ModuleDescriptor::core("2.400"),
            ModuleDescriptor::plugin("g:git:1", "", "Git", None),
            ModuleDescriptor::plugin("g:python-wrapper:1", "", "Python Wrapper", None),
            ModuleDescriptor::plugin("g:ant:1", "", "Ant", None),
        ];
        let artifacts = |selected: Vec<ModuleDescriptor>| -> Vec<String> {
            selected.iter().filter_map(|d| d.artifact_id()).collect()
        };

        let skip = vec!["python-wrapper".to_string()];
        assert_eq!(
            artifacts(select_modules(descriptors.clone(), &[], &skip)),
            vec!["jenkins-core", "git", "ant"]
        );
        assert_eq!(
            artifacts(select_modules(descriptors, &["ant".to_string()], &skip)),
            vec!["jenkins-core", "ant"]
        );
    }

    #[test]
    fn test_pool_size() {
        assert_eq!(pool_size(Some(5), 3, false), 5);
        assert_eq!(pool_size(Some(0), 3, false), 1);
        assert_eq!(pool_size(Some(5), 3, true), 1);
        assert_eq!(pool_size(None, 1, true), 1);
        assert!(pool_size(None, 3, false) >= 3);
    }
}
