//! Drives a build run: partner expansion, staleness checks and compilation.

use std::fmt;
use std::path::Path;

use crate::config::BuildConfig;
use crate::engine::{CompileEngine, EngineFactory, StencilEngineFactory};
use crate::error::{BuildError, Result};
use crate::fileset::{FileSelection, SelectedFiles};
use crate::partner::{FsPartnerSource, IdentityStrategy, PartnerSet, PartnerSource};

/// Progress of a run. `compiled <= considered` at all times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Artifacts actually (re)built
    pub compiled: usize,
    /// Compile units visited, fresh or not
    pub considered: usize,
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Compiled {} out of {} templates", self.compiled, self.considered)
    }
}

/// Compiles every selected template for the right partner(s).
///
/// Units are processed one at a time in a fixed order: partners (when
/// expanding), then file sets, then each file set's files. The first error
/// aborts the run; [`Orchestrator::counters`] still reports the progress made
/// up to that point and artifacts already written are left in place.
pub struct Orchestrator<'c> {
    config: &'c BuildConfig,
    counters: Counters,
}

impl<'c> Orchestrator<'c> {
    pub fn new(config: &'c BuildConfig) -> Self {
        Self {
            config,
            counters: Counters::default(),
        }
    }

    /// Counters of the current or last run
    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Run with the configured file sets, the stock engine and the
    /// filesystem partner listing
    pub fn run(&mut self) -> Result<Counters> {
        let config = self.config;
        self.run_with(&config.filesets, &StencilEngineFactory, &FsPartnerSource)
    }

    /// Run with explicit collaborators
    pub fn run_with<S, F, P>(&mut self, filesets: &[S], factory: &F, partners: &P) -> Result<Counters>
    where
        S: FileSelection,
        F: EngineFactory,
        P: PartnerSource,
    {
        let (compile_dir, partners_dir) = self.validate(filesets.len())?;

        ensure_dir(compile_dir)?;

        let settings = self.config.engine_settings(compile_dir);
        let mut engine = factory.create(settings).map_err(BuildError::EngineSetup)?;

        self.counters = Counters::default();

        if self.config.expand_partners {
            let partner_set = PartnerSet::from_entries(partners.entries(partners_dir)?);
            tracing::debug!("Expanding over partners: {}", partner_set.names().join(", "));

            for partner in partner_set.iter() {
                let strategy = IdentityStrategy::Fixed(partner.clone());
                for fileset in filesets {
                    let selected = fileset.select()?;
                    self.compile_selection(&mut engine, &selected, &strategy)?;
                }
            }
        } else {
            for fileset in filesets {
                let selected = fileset.select()?;
                self.compile_selection(&mut engine, &selected, &IdentityStrategy::PathDerived)?;
            }
        }

        tracing::info!("{}", self.counters);
        Ok(self.counters)
    }

    /// Check required settings before touching the filesystem
    fn validate(&self, fileset_count: usize) -> Result<(&'c Path, &'c Path)> {
        if fileset_count == 0 {
            return Err(BuildError::config("You must specify at least one fileset"));
        }
        let compile_dir = self
            .config
            .compile_dir
            .as_deref()
            .ok_or_else(|| BuildError::config("You must specify a location for compiled templates"))?;
        let partners_dir = self
            .config
            .partners_dir
            .as_deref()
            .ok_or_else(|| BuildError::config("You must specify the partners directory"))?;
        Ok((compile_dir, partners_dir))
    }

    /// Compile each selected file that has no fresh artifact
    fn compile_selection<E: CompileEngine>(
        &mut self,
        engine: &mut E,
        selected: &SelectedFiles,
        strategy: &IdentityStrategy,
    ) -> Result<()> {
        for name in &selected.files {
            let id = strategy.resolve(name)?;
            let artifact = engine.artifact_path(name, &id);

            let fresh = engine
                .is_up_to_date(&selected.base_dir, name, &artifact)
                .map_err(|e| BuildError::engine(name, &id, e))?;

            if fresh {
                tracing::trace!("Up to date: {} ({})", name, id);
            } else {
                tracing::debug!("Compiling {} ({})", name, id);
                engine
                    .compile(&selected.base_dir, name, &id, &artifact)
                    .map_err(|e| BuildError::engine(name, &id, e))?;
                self.counters.compiled += 1;
            }

            self.counters.considered += 1;
        }
        Ok(())
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    tracing::debug!("Compile directory does not exist, creating: {}", dir.display());
    std::fs::create_dir_all(dir).map_err(|source| BuildError::CreateOutputDir {
        path: dir.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use std::path::PathBuf;

    use stencil_engine::{EngineError, EngineSettings};

    use crate::partner::CompileId;

    /// Returns a fixed file list and counts how often it was asked
    struct FakeSelection {
        files: Vec<&'static str>,
        calls: Cell<usize>,
    }

    impl FakeSelection {
        fn new(files: &[&'static str]) -> Self {
            Self {
                files: files.to_vec(),
                calls: Cell::new(0),
            }
        }
    }

    impl FileSelection for FakeSelection {
        fn select(&self) -> Result<SelectedFiles> {
            self.calls.set(self.calls.get() + 1);
            Ok(SelectedFiles {
                base_dir: PathBuf::from("/templates"),
                files: self.files.iter().map(|f| f.to_string()).collect(),
            })
        }
    }

    /// In-memory engine: an artifact is fresh once compiled, unless forced
    #[derive(Default)]
    struct FakeEngine {
        force: bool,
        built: HashSet<PathBuf>,
        fail_on: Option<&'static str>,
    }

    impl CompileEngine for FakeEngine {
        fn artifact_path(&self, name: &str, id: &CompileId) -> PathBuf {
            PathBuf::from("/cache").join(id.as_str()).join(name)
        }

        fn is_up_to_date(&self, _dir: &Path, _name: &str, artifact: &Path) -> stencil_engine::Result<bool> {
            Ok(!self.force && self.built.contains(artifact))
        }

        fn compile(&mut self, _dir: &Path, name: &str, _id: &CompileId, artifact: &Path) -> stencil_engine::Result<()> {
            if self.fail_on == Some(name) {
                return Err(EngineError::SourceNotFound(PathBuf::from(name)));
            }
            self.built.insert(artifact.to_path_buf());
            Ok(())
        }
    }

    /// Hands out a prepared engine and records the settings it was given
    struct FakeFactory {
        engine: RefCell<Option<FakeEngine>>,
        settings: RefCell<Option<EngineSettings>>,
    }

    impl FakeFactory {
        fn new(engine: FakeEngine) -> Self {
            Self {
                engine: RefCell::new(Some(engine)),
                settings: RefCell::new(None),
            }
        }
    }

    impl EngineFactory for FakeFactory {
        type Engine = FakeEngine;

        fn create(&self, settings: EngineSettings) -> stencil_engine::Result<FakeEngine> {
            let mut engine = self.engine.borrow_mut().take().unwrap_or_default();
            engine.force = settings.force_compile;
            *self.settings.borrow_mut() = Some(settings);
            Ok(engine)
        }
    }

    struct FakePartners(Vec<&'static str>);

    impl PartnerSource for FakePartners {
        fn entries(&self, _dir: &Path) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    fn config(cache: &Path) -> BuildConfig {
        BuildConfig::new().compile_dir(cache).partners_dir("/partners")
    }

    #[test]
    fn test_path_derived_run() {
        let cache = tempfile::tempdir().unwrap();
        let config = config(cache.path());
        let files = FakeSelection::new(&["partners/acme/home.tpl", "partners/globex/home.tpl"]);
        let factory = FakeFactory::new(FakeEngine::default());

        let mut orchestrator = Orchestrator::new(&config);
        let counters = orchestrator
            .run_with(&[files], &factory, &FakePartners(vec![]))
            .unwrap();

        assert_eq!(counters, Counters { compiled: 2, considered: 2 });
        let settings = factory.settings.borrow();
        let settings = settings.as_ref().unwrap();
        assert!(settings.use_sub_dirs);
        assert_eq!(settings.compile_dir, cache.path());
    }

    #[test]
    fn test_expansion_visits_every_partner_and_fileset() {
        let cache = tempfile::tempdir().unwrap();
        let config = config(cache.path()).expand_partners(true);
        let filesets = [FakeSelection::new(&["a.tpl", "b.tpl"]), FakeSelection::new(&["c.tpl"])];
        let factory = FakeFactory::new(FakeEngine::default());

        let mut orchestrator = Orchestrator::new(&config);
        let counters = orchestrator
            .run_with(&filesets, &factory, &FakePartners(vec!["acme", ".hidden", "globex"]))
            .unwrap();

        // core + acme + globex, three files each
        assert_eq!(counters, Counters { compiled: 9, considered: 9 });
        // each file set is re-selected for every partner
        assert_eq!(filesets[0].calls.get(), 3);
        assert_eq!(filesets[1].calls.get(), 3);
    }

    #[test]
    fn test_expansion_order() {
        let cache = tempfile::tempdir().unwrap();
        let config = config(cache.path()).expand_partners(true);
        let files = [FakeSelection::new(&["a.tpl", "b.tpl"])];

        struct RecordingEngine<'a>(FakeEngine, &'a RefCell<Vec<(String, String)>>);

        impl CompileEngine for RecordingEngine<'_> {
            fn artifact_path(&self, name: &str, id: &CompileId) -> PathBuf {
                self.0.artifact_path(name, id)
            }
            fn is_up_to_date(&self, dir: &Path, name: &str, artifact: &Path) -> stencil_engine::Result<bool> {
                self.0.is_up_to_date(dir, name, artifact)
            }
            fn compile(&mut self, dir: &Path, name: &str, id: &CompileId, artifact: &Path) -> stencil_engine::Result<()> {
                self.1.borrow_mut().push((id.to_string(), name.to_string()));
                self.0.compile(dir, name, id, artifact)
            }
        }

        let log = RefCell::new(Vec::new());
        let factory =
            |_settings: EngineSettings| Ok::<_, EngineError>(RecordingEngine(FakeEngine::default(), &log));
        Orchestrator::new(&config)
            .run_with(&files, &factory, &FakePartners(vec!["acme"]))
            .unwrap();

        let log = log.into_inner();
        let order: Vec<(&str, &str)> = log.iter().map(|(p, f)| (p.as_str(), f.as_str())).collect();
        assert_eq!(
            order,
            vec![("core", "a.tpl"), ("core", "b.tpl"), ("acme", "a.tpl"), ("acme", "b.tpl")]
        );
    }

    #[test]
    fn test_closure_factory_setup_error() {
        let cache = tempfile::tempdir().unwrap();
        let config = config(cache.path());
        let files = [FakeSelection::new(&["partners/acme/x.tpl"])];
        let factory = |settings: EngineSettings| -> stencil_engine::Result<FakeEngine> {
            Err(EngineError::SourceNotFound(settings.compile_dir))
        };

        let err = Orchestrator::new(&config)
            .run_with(&files, &factory, &FakePartners(vec![]))
            .unwrap_err();
        assert!(matches!(err, BuildError::EngineSetup(_)));
        assert_eq!(files[0].calls.get(), 0);
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let cache = tempfile::tempdir().unwrap();
        let config = config(cache.path());
        let files = [FakeSelection::new(&["partners/acme/x.tpl", "partners/acme/y.tpl"])];

        let mut orchestrator = Orchestrator::new(&config);
        let first = orchestrator.run_with(&files, &FakeFactory::new(FakeEngine::default()), &FakePartners(vec![])).unwrap();
        assert_eq!(first.compiled, 2);

        // artifacts from the first run are still in the cache
        let mut engine = FakeEngine::default();
        engine.built.insert(PathBuf::from("/cache/acme/partners/acme/x.tpl"));
        engine.built.insert(PathBuf::from("/cache/acme/partners/acme/y.tpl"));
        let second = orchestrator.run_with(&files, &FakeFactory::new(engine), &FakePartners(vec![])).unwrap();
        assert_eq!(second, Counters { compiled: 0, considered: 2 });
    }

    #[test]
    fn test_force_recompiles_everything() {
        let cache = tempfile::tempdir().unwrap();
        let config = config(cache.path()).force_compile(true);
        let files = [FakeSelection::new(&["partners/acme/x.tpl"])];

        let mut engine = FakeEngine::default();
        engine.built.insert(PathBuf::from("/cache/acme/partners/acme/x.tpl"));

        let counters = Orchestrator::new(&config)
            .run_with(&files, &FakeFactory::new(engine), &FakePartners(vec![]))
            .unwrap();
        assert_eq!(counters, Counters { compiled: 1, considered: 1 });
    }

    #[test]
    fn test_unresolved_partner_halts_run() {
        let cache = tempfile::tempdir().unwrap();
        let config = config(cache.path());
        let files = [FakeSelection::new(&["partners/acme/x.tpl", "shared/y.tpl", "partners/acme/z.tpl"])];

        let mut orchestrator = Orchestrator::new(&config);
        let err = orchestrator
            .run_with(&files, &FakeFactory::new(FakeEngine::default()), &FakePartners(vec![]))
            .unwrap_err();

        assert!(matches!(err, BuildError::Unresolved { ref file } if file == "shared/y.tpl"));
        assert_eq!(orchestrator.counters(), Counters { compiled: 1, considered: 1 });
    }

    #[test]
    fn test_engine_failure_keeps_partial_counters() {
        let cache = tempfile::tempdir().unwrap();
        let config = config(cache.path()).expand_partners(true);
        let files = [FakeSelection::new(&["a.tpl", "broken.tpl", "c.tpl"])];
        let engine = FakeEngine {
            fail_on: Some("broken.tpl"),
            ..FakeEngine::default()
        };

        let mut orchestrator = Orchestrator::new(&config);
        let err = orchestrator
            .run_with(&files, &FakeFactory::new(engine), &FakePartners(vec!["acme"]))
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::Engine { ref file, ref partner, .. } if file == "broken.tpl" && partner == "core"
        ));
        assert_eq!(orchestrator.counters(), Counters { compiled: 1, considered: 1 });
    }

    #[test]
    fn test_missing_config_fails_before_selection() {
        let cache = tempfile::tempdir().unwrap();
        let files = [FakeSelection::new(&["partners/acme/x.tpl"])];
        let factory = FakeFactory::new(FakeEngine::default());

        let cases = [
            BuildConfig::new().partners_dir("/partners"),
            BuildConfig::new().compile_dir(cache.path()),
        ];
        for config in &cases {
            let err = Orchestrator::new(config)
                .run_with(&files, &factory, &FakePartners(vec![]))
                .unwrap_err();
            assert!(matches!(err, BuildError::Config(_)), "got {err:?}");
        }

        assert_eq!(files[0].calls.get(), 0);
        assert!(factory.settings.borrow().is_none());
    }

    #[test]
    fn test_no_filesets_is_config_error() {
        let cache = tempfile::tempdir().unwrap();
        let config = config(cache.path());
        let none: [FakeSelection; 0] = [];
        let err = Orchestrator::new(&config)
            .run_with(&none, &FakeFactory::new(FakeEngine::default()), &FakePartners(vec![]))
            .unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[test]
    fn test_creates_compile_dir() {
        let root = tempfile::tempdir().unwrap();
        let cache = root.path().join("deep/nested/cache");
        let config = config(&cache);
        let files = [FakeSelection::new(&[])];

        let counters = Orchestrator::new(&config)
            .run_with(&files, &FakeFactory::new(FakeEngine::default()), &FakePartners(vec![]))
            .unwrap();
        assert!(cache.is_dir());
        assert_eq!(counters, Counters::default());
    }

    #[test]
    fn test_uncreatable_compile_dir() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let config = config(&blocker.join("cache"));
        let files = [FakeSelection::new(&["partners/acme/x.tpl"])];

        let err = Orchestrator::new(&config)
            .run_with(&files, &FakeFactory::new(FakeEngine::default()), &FakePartners(vec![]))
            .unwrap_err();
        assert!(matches!(err, BuildError::CreateOutputDir { .. }));
        assert_eq!(files[0].calls.get(), 0);
    }

    #[test]
    fn test_summary_line() {
        let counters = Counters { compiled: 3, considered: 10 };
        assert_eq!(counters.to_string(), "Compiled 3 out of 10 templates");
    }
}
