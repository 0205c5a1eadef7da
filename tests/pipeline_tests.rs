// End-to-end runs of the pipeline driver against a scripted tool runner.
// The fake tools create the files the real executables would, so every
// on-disk check in the driver is exercised.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mosaic_pipeline::config::ConfigLoader;
use mosaic_pipeline::models::{Channel, DatasetState, StageTag};
use mosaic_pipeline::pipeline::{
    DatasetError, DatasetOutcome, PipelineDriver, StageLog, Tool, ToolExit, ToolInvocation, ToolRunner,
};
use tempfile::TempDir;

type FailWhen = Box<dyn Fn(&ToolInvocation) -> bool>;

/// Records every invocation and writes the outputs a real tool would
struct FakeTools {
    calls: Vec<ToolInvocation>,
    fail_when: FailWhen,
    /// Whether `Segm/Temp` still existed each time tracing started
    segm_temp_at_tracing: Vec<bool>,
    /// Dataset root whose segmentation leaves a plain file where `Segm/Temp`
    /// should be, so the folder cannot be removed
    broken_segm_temp: Option<PathBuf>,
}

impl FakeTools {
    fn new() -> Self {
        Self::failing(Box::new(|_: &ToolInvocation| false))
    }

    fn failing(fail_when: FailWhen) -> Self {
        Self {
            calls: Vec::new(),
            fail_when,
            segm_temp_at_tracing: Vec::new(),
            broken_segm_temp: None,
        }
    }

    fn breaking_segm_temp(root: PathBuf) -> Self {
        let mut tools = Self::new();
        tools.broken_segm_temp = Some(root);
        tools
    }

    fn calls_to(&self, tool: Tool) -> Vec<&ToolInvocation> {
        self.calls.iter().filter(|c| c.tool == tool).collect()
    }

    fn calls_under(&self, tool: Tool, root: &Path) -> usize {
        self.calls
            .iter()
            .filter(|c| c.tool == tool && c.args.iter().any(|a| Path::new(a).starts_with(root)))
            .count()
    }
}

fn option_value(options: &str, flag: &str) -> Option<String> {
    let prefix = format!("-{} ", flag);
    options
        .lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .map(str::to_string)
}

impl ToolRunner for FakeTools {
    fn run(&mut self, invocation: &ToolInvocation, log: &StageLog) -> io::Result<ToolExit> {
        log.append(&format!("fake: {}", invocation))?;
        self.calls.push(invocation.clone());
        if (self.fail_when)(invocation) {
            return Ok(ToolExit { code: Some(1) });
        }

        match invocation.tool {
            Tool::BackgroundSubtraction | Tool::Curvelets | Tool::Rescale | Tool::Rescale8Bit => {
                fs::write(format!("{}.nrrd", invocation.args[1]), b"voxels")?;
            }
            Tool::Rescale8BitMhd => {
                fs::write(format!("{}.mhd", invocation.args[1]), b"header")?;
            }
            Tool::Segmentation | Tool::Tracing => {
                let options_path = Path::new(&invocation.args[0]);
                let options = fs::read_to_string(options_path)?;
                if invocation.tool == Tool::Tracing {
                    let root = options_path.parent().and_then(Path::parent).unwrap();
                    self.segm_temp_at_tracing.push(root.join("Segm").join("Temp").exists());
                }
                let temp = PathBuf::from(option_value(&options, "outPathTemp").unwrap());
                let broken = invocation.tool == Tool::Segmentation
                    && self
                        .broken_segm_temp
                        .as_ref()
                        .map_or(false, |root| options_path.starts_with(root));
                if broken {
                    fs::remove_dir_all(&temp)?;
                    fs::write(&temp, b"not a folder")?;
                } else {
                    fs::write(temp.join("tile_0_0_0.nrrd"), b"partial")?;
                }
            }
            _ => {}
        }
        Ok(ToolExit::SUCCESS)
    }
}

struct Fixture {
    temp_dir: TempDir,
    config_path: PathBuf,
}

impl Fixture {
    /// `body` carries everything after `[paths]`, including `[[datasets]]`
    fn new(body: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let config = format!(
            "[paths]\ndata_root = '{}'\nsource_root = '{}'\nparams_root = '{}'\nresults_root = '{}'\n\n{}",
            base.join("data").display(),
            base.join("source").display(),
            base.join("params").display(),
            base.join("results").display(),
            body
        );
        let config_path = base.join("pipeline.toml");
        fs::write(&config_path, config).unwrap();
        Self { temp_dir, config_path }
    }

    fn add_raw(&self, id: &str, channels: &[Channel]) {
        let dir = self.temp_dir.path().join("source").join(id);
        fs::create_dir_all(&dir).unwrap();
        for channel in channels {
            fs::write(dir.join(format!("m_{}.nrrd", channel.source_marker())), b"raw").unwrap();
        }
    }

    fn root(&self, id: &str) -> PathBuf {
        self.temp_dir.path().join("data").join(id)
    }

    fn run(&self, tools: FakeTools) -> (Vec<DatasetOutcome>, PipelineDriver<FakeTools>) {
        let config = ConfigLoader::load(&self.config_path).unwrap();
        let work_list = config.work_list();
        let mut driver = PipelineDriver::new(config, tools);
        let outcomes = driver.run_all(&work_list);
        (outcomes, driver)
    }
}

#[test]
fn test_full_run_all_channels() {
    let fixture = Fixture::new("[[datasets]]\nid = 'd1'\n");
    fixture.add_raw("d1", &Channel::ALL);
    let shared = fixture.temp_dir.path().join("params").join("d1_PARAMS");
    fs::create_dir_all(&shared).unwrap();
    fs::write(shared.join("options_mnt"), "-somaThreshold 5\n").unwrap();

    let (outcomes, driver) = fixture.run(FakeTools::new());
    let outcome = &outcomes[0];
    assert_eq!(outcome.state, DatasetState::Done);
    assert_eq!(outcome.reached, DatasetState::TempTracCleaned);
    assert!(outcome.error.is_none());
    assert_eq!(outcome.active, Channel::ALL.to_vec());

    let root = fixture.root("d1");
    let data = root.join("Data");
    let gfp = outcome.lineage(Channel::Gfp).unwrap();
    let gfp_raw = data.join("m_GFPdsu").display().to_string();
    assert_eq!(gfp.raw(), gfp_raw);
    assert_eq!(gfp.current(), format!("{}_BS_CV", gfp_raw));
    assert_eq!(gfp.artifact(StageTag::RescaledFloat), Some(format!("{}_BS_CV_RE", gfp_raw).as_str()));
    assert_eq!(
        gfp.artifact(StageTag::Rescaled8Bit),
        Some(format!("{}_BS_CV_RE_bit", gfp_raw).as_str())
    );
    let dapi = outcome.lineage(Channel::Dapi).unwrap();
    assert_eq!(dapi.current(), format!("{}_BS", data.join("m_DAPIdsu").display()));
    assert_eq!(dapi.artifact(StageTag::Curvelet), None);

    let tools = driver.tools();
    assert_eq!(tools.calls_to(Tool::BackgroundSubtraction).len(), 4);
    assert_eq!(tools.calls_to(Tool::Curvelets).len(), 1);
    assert_eq!(tools.calls_to(Tool::Rescale8BitMhd).len(), 1);
    assert_eq!(tools.calls_to(Tool::Segmentation).len(), 1);
    assert_eq!(tools.calls_to(Tool::Tracing).len(), 1);
    let overlays = tools.calls_to(Tool::ProjectionRgb);
    assert_eq!(overlays.len(), 3);
    let labels: Vec<&str> = overlays.iter().map(|c| c.args[2].as_str()).collect();
    assert_eq!(labels, vec!["_GFP_SOMA_", "_DAPI_LABEL_", "_GFP_DAPI_"]);

    let segm_options = fs::read_to_string(root.join("Segm").join("options_segmentation")).unwrap();
    for flag in ["Cy5_Image", "TRI_Image", "GFP_Image", "DAP_Image"] {
        assert!(segm_options.contains(&format!("-{} ", flag)), "{} missing", flag);
    }
    let trace_options = fs::read_to_string(root.join("Trace").join("options_tracing")).unwrap();
    assert_eq!(
        option_value(&trace_options, "GFP_Image"),
        Some(format!("{}_BS_CV_RE", gfp_raw))
    );
    assert_eq!(
        option_value(&trace_options, "Soma_Montage"),
        Some(format!("{}_BS_CV_RE_bit_soma", gfp_raw))
    );

    assert!(root.join("Parameters").join("options_mnt").is_file());
    assert!(!root.join("Segm").join("Temp").exists());
    assert!(!root.join("Trace").join("Temp").exists());
    for log in ["copy.log", "background.log", "curvelet_db.log", "segmentation.log", "tracing_db.log"] {
        assert!(root.join("Log").join(log).is_file(), "{} missing", log);
    }
    assert!(fixture.temp_dir.path().join("results").join("d1").is_dir());
}

#[test]
fn test_absent_channel_never_reaches_tools() {
    let fixture = Fixture::new("[[datasets]]\nid = 'd1'\n");
    fixture.add_raw("d1", &[Channel::Tritc, Channel::Gfp, Channel::Dapi]);

    let (outcomes, driver) = fixture.run(FakeTools::new());
    let outcome = &outcomes[0];
    assert_eq!(outcome.state, DatasetState::Done);
    assert_eq!(outcome.active, vec![Channel::Tritc, Channel::Gfp, Channel::Dapi]);
    assert!(outcome.lineage(Channel::Cy5).is_none());

    let tools = driver.tools();
    assert!(tools
        .calls
        .iter()
        .all(|call| call.args.iter().all(|arg| !arg.contains("Cy5dsu"))));
    assert_eq!(tools.calls_to(Tool::BackgroundSubtraction).len(), 3);

    let root = fixture.root("d1");
    let segm_options = fs::read_to_string(root.join("Segm").join("options_segmentation")).unwrap();
    assert!(!segm_options.contains("-Cy5_Image"));
    let trace_options = fs::read_to_string(root.join("Trace").join("options_tracing")).unwrap();
    assert!(!trace_options.contains("-Cy5_Image"));
    let copy_log = fs::read_to_string(root.join("Log").join("copy.log")).unwrap();
    assert!(copy_log.contains("FAILED Cy5"));
}

#[test]
fn test_segmentation_temp_removed_before_tracing() {
    let fixture = Fixture::new("[[datasets]]\nid = 'd1'\n");
    fixture.add_raw("d1", &Channel::ALL);

    let (outcomes, driver) = fixture.run(FakeTools::new());
    assert_eq!(outcomes[0].state, DatasetState::Done);
    assert_eq!(driver.tools().segm_temp_at_tracing, vec![false]);
    assert_eq!(driver.tools().calls_to(Tool::Tracing).len(), 1);
}

#[test]
fn test_cleanup_disabled_keeps_temp() {
    let fixture = Fixture::new(
        "[cleanup]\nsegmentation_temp = false\ntracing_temp = false\n\n[[datasets]]\nid = 'd1'\n",
    );
    fixture.add_raw("d1", &Channel::ALL);

    let (outcomes, driver) = fixture.run(FakeTools::new());
    assert_eq!(outcomes[0].state, DatasetState::Done);
    assert_eq!(driver.tools().segm_temp_at_tracing, vec![true]);
    let root = fixture.root("d1");
    assert!(root.join("Segm").join("Temp").join("tile_0_0_0.nrrd").is_file());
    assert!(root.join("Trace").join("Temp").join("tile_0_0_0.nrrd").is_file());
}

#[test]
fn test_segmentation_failure_fails_only_that_dataset() {
    let fixture = Fixture::new("[[datasets]]\nid = 'd1'\n\n[[datasets]]\nid = 'd2'\n");
    fixture.add_raw("d1", &Channel::ALL);
    fixture.add_raw("d2", &Channel::ALL);
    let d1 = fixture.root("d1");
    let d2 = fixture.root("d2");

    let failing_root = d1.clone();
    let tools = FakeTools::failing(Box::new(move |call: &ToolInvocation| {
        call.tool == Tool::Segmentation && Path::new(&call.args[0]).starts_with(&failing_root)
    }));
    let (outcomes, driver) = fixture.run(tools);

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].state, DatasetState::Failed);
    assert_eq!(outcomes[0].reached, DatasetState::Rescaled8Bit);
    assert!(matches!(
        outcomes[0].error,
        Some(DatasetError::AggregateStage { tool: Tool::Segmentation, .. })
    ));
    assert_eq!(outcomes[1].state, DatasetState::Done);
    assert_eq!(outcomes[1].reached, DatasetState::TempTracCleaned);

    let tools = driver.tools();
    assert_eq!(tools.calls_under(Tool::Tracing, &d1), 0);
    assert_eq!(tools.calls_under(Tool::Tracing, &d2), 1);
    assert_eq!(tools.calls_under(Tool::BackgroundSubtraction, &d2), 4);

    let segm_log = fs::read_to_string(d1.join("Log").join("segmentation.log")).unwrap();
    assert!(segm_log.contains("FAILED Segmentation failed"));
    assert!(!d1.join("Log").join("tracing.log").exists());
}

#[test]
fn test_channel_failure_drops_channel_for_rest_of_run() {
    let fixture = Fixture::new("[[datasets]]\nid = 'd1'\n");
    fixture.add_raw("d1", &Channel::ALL);

    let tools = FakeTools::failing(Box::new(|call: &ToolInvocation| {
        call.tool == Tool::BackgroundSubtraction && call.args[0].contains("TRITCdsu")
    }));
    let (outcomes, driver) = fixture.run(tools);
    let outcome = &outcomes[0];
    assert_eq!(outcome.state, DatasetState::Done);
    assert_eq!(outcome.active, vec![Channel::Cy5, Channel::Gfp, Channel::Dapi]);

    // Only the failed attempt itself mentions TRITC after the copy projections
    let tritc_calls: Vec<&ToolInvocation> = driver
        .tools()
        .calls
        .iter()
        .filter(|c| c.tool != Tool::Projection && c.args.iter().any(|a| a.contains("TRITCdsu")))
        .collect();
    assert_eq!(tritc_calls.len(), 1);
    assert_eq!(tritc_calls[0].tool, Tool::BackgroundSubtraction);

    let root = fixture.root("d1");
    let segm_options = fs::read_to_string(root.join("Segm").join("options_segmentation")).unwrap();
    assert!(!segm_options.contains("-TRI_Image"));
    assert!(segm_options.contains("-GFP_Image"));
}

#[test]
fn test_curvelet_failure_drops_gfp_only() {
    let fixture = Fixture::new("[[datasets]]\nid = 'd1'\n");
    fixture.add_raw("d1", &Channel::ALL);

    let tools = FakeTools::failing(Box::new(|call: &ToolInvocation| call.tool == Tool::Curvelets));
    let (outcomes, driver) = fixture.run(tools);
    let outcome = &outcomes[0];
    assert_eq!(outcome.state, DatasetState::Done);
    assert_eq!(outcome.active, vec![Channel::Cy5, Channel::Tritc, Channel::Dapi]);

    let tools = driver.tools();
    assert!(tools.calls_to(Tool::Rescale8BitMhd).is_empty());
    assert!(tools.calls_to(Tool::ProjectionFloat).is_empty());
    assert!(tools.calls_to(Tool::ProjectionRgb).is_empty());

    let trace_options = fs::read_to_string(fixture.root("d1").join("Trace").join("options_tracing")).unwrap();
    assert!(!trace_options.contains("-GFP_Image"));
    assert!(!trace_options.contains("-Soma_Centroids"));
    assert!(trace_options.contains("-DAP_Image"));
}

#[test]
fn test_debug_projection_failure_is_not_fatal() {
    let fixture = Fixture::new("[[datasets]]\nid = 'd1'\n");
    fixture.add_raw("d1", &Channel::ALL);

    let tools = FakeTools::failing(Box::new(|call: &ToolInvocation| {
        matches!(call.tool, Tool::Projection | Tool::Projection8Bit | Tool::ProjectionRgb)
    }));
    let (outcomes, _driver) = fixture.run(tools);
    assert_eq!(outcomes[0].state, DatasetState::Done);
    assert_eq!(outcomes[0].active, Channel::ALL.to_vec());

    let debug_log = fs::read_to_string(fixture.root("d1").join("Log").join("background_db.log")).unwrap();
    assert!(debug_log.contains("FAILED"));
}

#[test]
fn test_disabled_stages_reuse_existing_artifacts() {
    let fixture = Fixture::new(
        "[stages.copy]\nrun = false\n\n[stages.background]\nrun = false\n\n[[datasets]]\nid = 'd1'\nchannels = ['GFP']\n",
    );
    let data = fixture.root("d1").join("Data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("m_GFPdsu.nrrd"), b"raw").unwrap();
    fs::write(data.join("m_GFPdsu_BS.nrrd"), b"bs").unwrap();

    let (outcomes, driver) = fixture.run(FakeTools::new());
    let outcome = &outcomes[0];
    assert_eq!(outcome.state, DatasetState::Done);
    assert_eq!(outcome.active, vec![Channel::Gfp]);

    let tools = driver.tools();
    assert!(tools.calls_to(Tool::BackgroundSubtraction).is_empty());
    let curvelets = tools.calls_to(Tool::Curvelets);
    assert_eq!(curvelets.len(), 1);
    assert_eq!(curvelets[0].args[0], data.join("m_GFPdsu_BS").display().to_string());
    assert!(!fixture.root("d1").join("Log").join("background.log").exists());
}

#[test]
fn test_disabled_channel_is_never_activated() {
    let fixture = Fixture::new("[channels]\ndapi = false\n\n[[datasets]]\nid = 'd1'\n");
    fixture.add_raw("d1", &Channel::ALL);

    let (outcomes, driver) = fixture.run(FakeTools::new());
    assert_eq!(outcomes[0].active, vec![Channel::Cy5, Channel::Tritc, Channel::Gfp]);
    assert!(driver
        .tools()
        .calls
        .iter()
        .all(|call| call.args.iter().all(|arg| !arg.contains("DAPIdsu"))));
    // No DAPI partner for the label and GFP/DAPI overlays
    assert_eq!(driver.tools().calls_to(Tool::ProjectionRgb).len(), 1);
}

#[test]
fn test_no_active_channel_skips_aggregate_stages() {
    let fixture = Fixture::new("[[datasets]]\nid = 'd1'\n");
    fixture.add_raw("d1", &[]);

    let (outcomes, driver) = fixture.run(FakeTools::new());
    assert_eq!(outcomes[0].state, DatasetState::Done);
    assert!(outcomes[0].active.is_empty());
    assert!(driver.tools().calls.is_empty());
    assert!(!fixture.root("d1").join("Segm").join("options_segmentation").exists());
}

#[test]
fn test_cleanup_failure_fails_dataset_before_tracing() {
    let fixture = Fixture::new("[[datasets]]\nid = 'd1'\n\n[[datasets]]\nid = 'd2'\n");
    fixture.add_raw("d1", &Channel::ALL);
    fixture.add_raw("d2", &Channel::ALL);
    let d1 = fixture.root("d1");
    let d2 = fixture.root("d2");

    let (outcomes, driver) = fixture.run(FakeTools::breaking_segm_temp(d1.clone()));

    assert_eq!(outcomes[0].state, DatasetState::Failed);
    assert_eq!(outcomes[0].reached, DatasetState::Segmented);
    assert!(matches!(outcomes[0].error, Some(DatasetError::Cleanup { .. })));
    assert_eq!(driver.tools().calls_under(Tool::Tracing, &d1), 0);
    assert!(!d1.join("Log").join("tracing.log").exists());

    assert_eq!(outcomes[1].state, DatasetState::Done);
    assert_eq!(outcomes[1].reached, DatasetState::TempTracCleaned);
    assert_eq!(driver.tools().calls_under(Tool::Tracing, &d2), 1);
    assert!(!d2.join("Segm").join("Temp").exists());
}

#[test]
fn test_unwritable_options_file_fails_dataset() {
    let fixture = Fixture::new("[[datasets]]\nid = 'd1'\n\n[[datasets]]\nid = 'd2'\n");
    fixture.add_raw("d1", &Channel::ALL);
    fixture.add_raw("d2", &Channel::ALL);
    let d1 = fixture.root("d1");
    let d2 = fixture.root("d2");
    // A folder in place of the options file cannot be written
    fs::create_dir_all(d1.join("Trace").join("options_tracing")).unwrap();

    let (outcomes, driver) = fixture.run(FakeTools::new());

    assert_eq!(outcomes[0].state, DatasetState::Failed);
    assert_eq!(outcomes[0].reached, DatasetState::TempSegmCleaned);
    match &outcomes[0].error {
        Some(DatasetError::ConfigWrite { path, .. }) => {
            assert_eq!(path, &d1.join("Trace").join("options_tracing"));
        }
        other => panic!("expected ConfigWrite, got {:?}", other),
    }
    assert_eq!(driver.tools().calls_under(Tool::Tracing, &d1), 0);
    let trace_log = fs::read_to_string(d1.join("Log").join("tracing.log")).unwrap();
    assert!(trace_log.contains("FAILED failed to write"));

    assert_eq!(outcomes[1].state, DatasetState::Done);
    assert_eq!(driver.tools().calls_under(Tool::BackgroundSubtraction, &d2), 4);
    assert_eq!(driver.tools().calls_under(Tool::Tracing, &d2), 1);
}

#[test]
fn test_tracing_failure_fails_only_that_dataset() {
    let fixture = Fixture::new("[[datasets]]\nid = 'd1'\n\n[[datasets]]\nid = 'd2'\n");
    fixture.add_raw("d1", &Channel::ALL);
    fixture.add_raw("d2", &Channel::ALL);
    let d1 = fixture.root("d1");
    let d2 = fixture.root("d2");

    let failing_root = d1.clone();
    let tools = FakeTools::failing(Box::new(move |call: &ToolInvocation| {
        call.tool == Tool::Tracing && Path::new(&call.args[0]).starts_with(&failing_root)
    }));
    let (outcomes, driver) = fixture.run(tools);

    assert_eq!(outcomes[0].state, DatasetState::Failed);
    assert_eq!(outcomes[0].reached, DatasetState::TempSegmCleaned);
    assert!(matches!(
        outcomes[0].error,
        Some(DatasetError::AggregateStage { tool: Tool::Tracing, .. })
    ));
    // No tracing projections or tracing cleanup after the failure
    assert_eq!(driver.tools().calls_under(Tool::ProjectionFloat, &d1), 0);
    assert!(d1.join("Trace").join("Temp").exists());

    assert_eq!(outcomes[1].state, DatasetState::Done);
    assert_eq!(driver.tools().calls_under(Tool::Tracing, &d2), 1);
}

#[test]
fn test_source_inside_data_folder_keeps_raw_images() {
    let fixture = Fixture::new("[[datasets]]\nid = 'd1'\nchannels = ['GFP']\nsource = 'data/d1/Data'\n");
    let data = fixture.root("d1").join("Data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("m_GFPdsu.nrrd"), b"raw voxels").unwrap();

    let (outcomes, _driver) = fixture.run(FakeTools::new());

    assert_eq!(outcomes[0].state, DatasetState::Done);
    assert_eq!(outcomes[0].active, vec![Channel::Gfp]);
    assert_eq!(fs::read(data.join("m_GFPdsu.nrrd")).unwrap(), b"raw voxels");
}
