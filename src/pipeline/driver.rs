use std::collections::BTreeMap;
use std::path::Path;

use log::{error, info, warn};

use crate::config::{PipelineConfig, ToolSettings};
use crate::models::{
    artifact_file, ArtifactLineage, Channel, Dataset, DatasetPaths, DatasetState, Pass, Stage, StageRun,
    StageTag,
};
use crate::pipeline::bootstrap::{self, is_present};
use crate::pipeline::options::{segmentation_options, tracing_options};
use crate::pipeline::{
    error_chain, ChannelFailure, ChannelRegistry, DatasetError, StageLog, StageOptions, StageRunner, Tool,
    ToolInvocation, ToolRunner,
};

const PROJECTION_MODE: &str = "ORG_RES_HISTO";
const PROJECTION_BIN_MODE: &str = "ORG_RES_BIN_HISTO";
const PROJECTION_FORMAT: &str = "TIFF";

/// Working state of one dataset. Owned by a single iteration of the driver
/// loop; nothing carries over to the next dataset.
#[derive(Debug)]
pub struct DatasetRun {
    dataset: Dataset,
    paths: DatasetPaths,
    registry: ChannelRegistry,
    lineages: BTreeMap<Channel, ArtifactLineage>,
    state: DatasetState,
}

impl DatasetRun {
    fn new(dataset: &Dataset, config: &PipelineConfig) -> Self {
        Self {
            paths: dataset.paths(),
            registry: ChannelRegistry::new(&config.channels, dataset),
            dataset: dataset.clone(),
            lineages: BTreeMap::new(),
            state: DatasetState::Init,
        }
    }

    fn deactivate(&mut self, channel: Channel, reason: &str) {
        self.registry.deactivate(channel, &format!("[{}] {}", self.dataset.id, reason));
    }

    /// Drop every channel whose work failed in a main stage pass
    fn drop_failed(&mut self, run: &StageRun) {
        for channel in &run.failed {
            self.deactivate(*channel, &format!("{} failed", run.stage));
        }
    }

    /// Move to `state`. DONE and FAILED are final; nothing leaves them.
    fn advance(&mut self, state: DatasetState) {
        if self.state.is_terminal() {
            warn!("[{}] ignoring {} -> {}", self.dataset.id, self.state, state);
            return;
        }
        info!("[{}] {} -> {}", self.dataset.id, self.state, state);
        self.state = state;
    }
}

/// Result of one dataset, returned by [`PipelineDriver::run_all`]
#[derive(Debug)]
pub struct DatasetOutcome {
    pub id: String,
    /// `Done` or `Failed`
    pub state: DatasetState,
    /// Last state reached before finishing or failing
    pub reached: DatasetState,
    pub error: Option<DatasetError>,
    pub active: Vec<Channel>,
    pub lineages: BTreeMap<Channel, ArtifactLineage>,
}

impl DatasetOutcome {
    pub fn lineage(&self, channel: Channel) -> Option<&ArtifactLineage> {
        self.lineages.get(&channel)
    }
}

/// One unit of a per-channel stage: the artifact read and the one written
struct ChannelStep {
    input: String,
    output: String,
}

/// Sequences the stages of every dataset in the work list
pub struct PipelineDriver<R: ToolRunner> {
    config: PipelineConfig,
    tools: R,
}

impl<R: ToolRunner> PipelineDriver<R> {
    pub fn new(config: PipelineConfig, tools: R) -> Self {
        Self { config, tools }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tools(&self) -> &R {
        &self.tools
    }

    /// Run every dataset in order. A failed dataset is logged and the
    /// next one starts from scratch.
    pub fn run_all(&mut self, work_list: &[Dataset]) -> Vec<DatasetOutcome> {
        let mut outcomes = Vec::with_capacity(work_list.len());
        for (i, dataset) in work_list.iter().enumerate() {
            info!("==== Dataset {} ({}/{}) ====", dataset.id, i + 1, work_list.len());
            outcomes.push(self.run_dataset(dataset));
        }

        let failed = outcomes.iter().filter(|o| o.state == DatasetState::Failed).count();
        info!(
            "Batch finished: {} dataset(s) done, {} failed",
            outcomes.len() - failed,
            failed
        );
        outcomes
    }

    /// Run the full stage sequence for one dataset
    pub fn run_dataset(&mut self, dataset: &Dataset) -> DatasetOutcome {
        let mut run = DatasetRun::new(dataset, &self.config);
        let result = self.run_stages(&mut run);

        let reached = run.state;
        let (state, error) = match result {
            Ok(()) => {
                run.advance(DatasetState::Done);
                (DatasetState::Done, None)
            }
            Err(e) => {
                error!("[{}] FAILED after {}: {}", dataset.id, reached, error_chain(&e));
                run.state = DatasetState::Failed;
                (DatasetState::Failed, Some(e))
            }
        };

        DatasetOutcome {
            id: dataset.id.clone(),
            state,
            reached,
            error,
            active: run.registry.active(),
            lineages: run.lineages,
        }
    }

    fn run_stages(&mut self, run: &mut DatasetRun) -> Result<(), DatasetError> {
        bootstrap::create_folders(&run.paths, &run.dataset.results_dest)?;
        bootstrap::sync_parameters(&run.dataset.params_source, &run.paths.parameters);
        run.advance(DatasetState::FoldersReady);

        self.copy(run)?;
        self.debug_channels(run, Stage::Copy, Tool::Projection, None)?;
        run.advance(DatasetState::Copied);

        self.channel_stage(run, Stage::BackgroundSubtraction, StageTag::BackgroundSubtracted)?;
        self.debug_channels(run, Stage::BackgroundSubtraction, Tool::Projection, Some(StageTag::BackgroundSubtracted))?;
        run.advance(DatasetState::BackgroundSubtracted);

        self.channel_stage(run, Stage::Curvelet, StageTag::Curvelet)?;
        self.debug_channels(run, Stage::Curvelet, Tool::Projection, Some(StageTag::Curvelet))?;
        run.advance(DatasetState::CurveletApplied);

        self.channel_stage(run, Stage::RescaleFloat, StageTag::RescaledFloat)?;
        self.debug_channels(run, Stage::RescaleFloat, Tool::Projection, Some(StageTag::RescaledFloat))?;
        run.advance(DatasetState::RescaledFloat);

        self.channel_stage(run, Stage::Rescale8Bit, StageTag::Rescaled8Bit)?;
        self.debug_channels(run, Stage::Rescale8Bit, Tool::Projection8Bit, Some(StageTag::Rescaled8Bit))?;
        run.advance(DatasetState::Rescaled8Bit);

        self.segmentation(run)?;
        self.debug_segmentation(run)?;
        run.advance(DatasetState::Segmented);
        if self.config.cleanup.segmentation_temp {
            bootstrap::remove_temp(&run.paths.segm_temp)?;
        }
        run.advance(DatasetState::TempSegmCleaned);

        self.tracing(run)?;
        // Projects from the tracing temp folder, so it runs before cleanup
        self.debug_tracing(run)?;
        run.advance(DatasetState::Traced);
        if self.config.cleanup.tracing_temp {
            bootstrap::remove_temp(&run.paths.trace_temp)?;
        }
        run.advance(DatasetState::TempTracCleaned);

        Ok(())
    }

    /// Bring raw images into `Data`, or find them there when copying is off.
    /// Channels without a usable image are deactivated here.
    fn copy(&mut self, run: &mut DatasetRun) -> Result<(), DatasetError> {
        let ext = self.config.paths.image_extension.as_str();
        let candidates = run.registry.active();
        let mut found: Vec<(Channel, String)> = Vec::new();

        if self.config.stages.copy.run {
            let source_dir = run.dataset.source_root.as_path();
            let data_dir = run.paths.data.as_path();
            let runner = StageRunner::new(&run.dataset.id, &run.paths.log);
            let units = candidates.iter().map(|c| (*c, ())).collect();
            let stage_run = runner.per_channel(Stage::Copy, Pass::Main, units, |channel, _, log| {
                let base = bootstrap::copy_source(channel, source_dir, data_dir, ext)?;
                note(log, &format!("{}: {}", channel, base));
                found.push((channel, base));
                Ok(())
            })?;
            run.drop_failed(&stage_run);
        } else {
            for channel in candidates {
                match bootstrap::find_local(channel, &run.paths.data, ext) {
                    Ok(base) => found.push((channel, base)),
                    Err(failure) => run.deactivate(channel, &failure.to_string()),
                }
            }
        }

        for (channel, base) in found {
            run.lineages.insert(channel, ArtifactLineage::new(channel, base));
        }
        Ok(())
    }

    /// Apply `tag` to every eligible active channel and, when the stage is
    /// enabled, run its tool per channel. A disabled stage still derives the
    /// names so later stages pick up artifacts left by an earlier run.
    fn channel_stage(&mut self, run: &mut DatasetRun, stage: Stage, tag: StageTag) -> Result<(), DatasetError> {
        let mut steps: Vec<(Channel, ChannelStep)> = Vec::new();
        for channel in run.registry.active() {
            if tag == StageTag::Curvelet && !channel.receives_curvelet() {
                continue;
            }
            let lineage = match run.lineages.get_mut(&channel) {
                Some(lineage) => lineage,
                None => continue,
            };
            let input = lineage.current().to_string();
            let output = if tag.is_branch() {
                lineage.branch(tag)?.to_string()
            } else {
                lineage.advance(tag)?.to_string()
            };
            steps.push((channel, ChannelStep { input, output }));
        }

        if !self.config.stages.get(stage).run {
            info!("[{}] {} disabled; reusing existing artifacts", run.dataset.id, stage);
            return Ok(());
        }
        if steps.is_empty() {
            info!("[{}] {}: no active channel", run.dataset.id, stage);
            return Ok(());
        }

        let ext = self.config.paths.image_extension.as_str();
        let settings = &self.config.tools;
        let tools = &mut self.tools;
        let params_dir = run.paths.parameters.as_path();
        let runner = StageRunner::new(&run.dataset.id, &run.paths.log);

        let stage_run = runner.per_channel(stage, Pass::Main, steps, |channel, step, log| {
            let input = artifact_file(&step.input, ext);
            if !is_present(&input) {
                return Err(ChannelFailure::MissingInput { channel, path: input });
            }

            let mut invocations = Vec::new();
            match stage {
                Stage::BackgroundSubtraction => invocations.push(
                    ToolInvocation::new(Tool::BackgroundSubtraction, settings)
                        .arg(&step.input)
                        .arg(&step.output)
                        .path_arg(params_dir),
                ),
                Stage::Curvelet => invocations.push(
                    ToolInvocation::new(Tool::Curvelets, settings)
                        .arg(&step.input)
                        .arg(&step.output)
                        .path_arg(&params_dir.join("options_curvelets")),
                ),
                Stage::RescaleFloat => invocations.push(
                    ToolInvocation::new(Tool::Rescale, settings)
                        .arg(&step.input)
                        .arg(&step.output),
                ),
                Stage::Rescale8Bit => {
                    invocations.push(
                        ToolInvocation::new(Tool::Rescale8Bit, settings)
                            .arg(&step.input)
                            .arg(&step.output),
                    );
                    if channel.exports_mhd() {
                        invocations.push(
                            ToolInvocation::new(Tool::Rescale8BitMhd, settings)
                                .arg(&step.input)
                                .arg(&step.output),
                        );
                    }
                }
                Stage::Copy | Stage::Segmentation | Stage::Tracing => {}
            }

            let mut last_tool = None;
            for invocation in &invocations {
                invoke_for_channel(tools, invocation, log, channel)?;
                last_tool = Some(invocation.tool);
            }

            let output = artifact_file(&step.output, ext);
            match last_tool {
                Some(tool) if !is_present(&output) => Err(ChannelFailure::MissingOutput {
                    channel,
                    tool,
                    path: output,
                }),
                _ => Ok(()),
            }
        })?;

        run.drop_failed(&stage_run);
        Ok(())
    }

    /// Project each active channel's artifact of a stage for visual QA.
    /// `tag` of `None` projects the raw image.
    fn debug_channels(
        &mut self,
        run: &mut DatasetRun,
        stage: Stage,
        tool: Tool,
        tag: Option<StageTag>,
    ) -> Result<(), DatasetError> {
        let toggle = self.config.stages.get(stage);
        if !toggle.debug {
            return Ok(());
        }

        let mut units = Vec::new();
        for channel in run.registry.active() {
            let name = run.lineages.get(&channel).and_then(|lineage| match tag {
                Some(tag) => lineage.artifact(tag),
                None => Some(lineage.raw()),
            });
            if let Some(name) = name {
                let invocation = ToolInvocation::new(tool, &self.config.tools)
                    .arg(name)
                    .path_arg(&run.paths.data_debug)
                    .arg(PROJECTION_MODE)
                    .arg(PROJECTION_FORMAT);
                units.push((channel, invocation));
            }
        }

        self.debug_pass(run, stage, units)
    }

    /// Debug projections never deactivate a channel; failures are only logged
    fn debug_pass(
        &mut self,
        run: &DatasetRun,
        stage: Stage,
        units: Vec<(Channel, ToolInvocation)>,
    ) -> Result<(), DatasetError> {
        if units.is_empty() {
            return Ok(());
        }
        let tools = &mut self.tools;
        let runner = StageRunner::new(&run.dataset.id, &run.paths.log);
        let stage_run = runner.per_channel(stage, Pass::Debug, units, |channel, invocation, log| {
            invoke_for_channel(tools, &invocation, log, channel)
        })?;
        if !stage_run.succeeded() {
            info!(
                "[{}] {} projections incomplete; see {}",
                run.dataset.id,
                stage,
                stage_run.log_path.display()
            );
        }
        Ok(())
    }

    /// Collect each active channel's input for an aggregate stage,
    /// deactivating channels whose artifact is not on disk
    fn aggregate_inputs(
        &self,
        run: &mut DatasetRun,
        stage: Stage,
        input_of: fn(&Channel) -> StageTag,
    ) -> Vec<(Channel, String)> {
        let ext = self.config.paths.image_extension.as_str();
        let mut inputs = Vec::new();
        for channel in run.registry.active() {
            let tag = input_of(&channel);
            let name = run
                .lineages
                .get(&channel)
                .and_then(|lineage| lineage.artifact(tag))
                .map(str::to_string);
            match name {
                Some(name) if is_present(&artifact_file(&name, ext)) => inputs.push((channel, name)),
                Some(name) => {
                    let missing = ChannelFailure::MissingInput {
                        channel,
                        path: artifact_file(&name, ext),
                    };
                    run.deactivate(channel, &format!("{}: {}", stage, missing));
                }
                None => run.deactivate(channel, &format!("{}: no {} artifact", stage, tag)),
            }
        }
        inputs
    }

    fn segmentation(&mut self, run: &mut DatasetRun) -> Result<(), DatasetError> {
        if !self.config.stages.segmentation.run {
            info!("[{}] Segmentation disabled", run.dataset.id);
            return Ok(());
        }
        if !run.registry.any_active() {
            warn!("[{}] Segmentation skipped: no active channel", run.dataset.id);
            return Ok(());
        }
        let images = self.aggregate_inputs(run, Stage::Segmentation, Channel::segmentation_input);
        if images.is_empty() {
            warn!("[{}] Segmentation skipped: no channel has its input on disk", run.dataset.id);
            return Ok(());
        }

        let options = segmentation_options(&self.config.segmentation, &run.paths, &images);
        let options_path = run.paths.segmentation_options();
        self.aggregate_stage(run, Stage::Segmentation, Tool::Segmentation, &options, &options_path)
    }

    fn tracing(&mut self, run: &mut DatasetRun) -> Result<(), DatasetError> {
        if !self.config.stages.tracing.run {
            info!("[{}] Tracing disabled", run.dataset.id);
            return Ok(());
        }
        if !run.registry.any_active() {
            warn!("[{}] Tracing skipped: no active channel", run.dataset.id);
            return Ok(());
        }
        let images = self.aggregate_inputs(run, Stage::Tracing, Channel::tracing_input);
        if images.is_empty() {
            warn!("[{}] Tracing skipped: no channel has its input on disk", run.dataset.id);
            return Ok(());
        }

        let soma_source = gfp_8bit(run).map(str::to_string);
        let options = tracing_options(&self.config.tracing, &run.paths, &images, soma_source.as_deref());
        let options_path = run.paths.tracing_options();
        self.aggregate_stage(run, Stage::Tracing, Tool::Tracing, &options, &options_path)
    }

    /// Write the options file and run the tool once; any failure is fatal
    fn aggregate_stage(
        &mut self,
        run: &DatasetRun,
        stage: Stage,
        tool: Tool,
        options: &StageOptions,
        options_path: &Path,
    ) -> Result<(), DatasetError> {
        let invocation = ToolInvocation::new(tool, &self.config.tools).path_arg(options_path);
        let tools = &mut self.tools;
        let runner = StageRunner::new(&run.dataset.id, &run.paths.log);

        runner.aggregate(stage, Pass::Main, |log| {
            options.write(options_path)?;
            note(log, &format!("Options: {} ({} lines)", options_path.display(), options.entries().len()));
            let exit = tools
                .run(&invocation, log)
                .map_err(|source| DatasetError::AggregateLaunch { stage, tool, source })?;
            if exit.success() {
                Ok(())
            } else {
                Err(DatasetError::AggregateStage { stage, tool, exit })
            }
        })?;
        Ok(())
    }

    /// Soma and label montages, plus RGB overlays of the channels still active
    fn debug_segmentation(&mut self, run: &mut DatasetRun) -> Result<(), DatasetError> {
        if !self.config.stages.segmentation.debug {
            return Ok(());
        }
        let settings = &self.config.tools;
        let out_dir = run.paths.segm_debug.as_path();
        let gfp = gfp_8bit(run).map(str::to_string);
        let dapi = run
            .registry
            .is_active(Channel::Dapi)
            .then(|| run.lineages.get(&Channel::Dapi))
            .flatten()
            .and_then(|lineage| lineage.artifact(StageTag::Rescaled8Bit))
            .map(str::to_string);

        let mut units = Vec::new();
        if let Some(gfp) = &gfp {
            let soma = format!("{}_soma", gfp);
            let label = format!("{}_label", gfp);
            for montage in [&soma, &label] {
                units.push((
                    Channel::Gfp,
                    ToolInvocation::new(Tool::Projection, settings)
                        .arg(montage.as_str())
                        .path_arg(out_dir)
                        .arg(PROJECTION_BIN_MODE)
                        .arg(PROJECTION_FORMAT),
                ));
            }
            units.push((Channel::Gfp, rgb_overlay(settings, gfp, &soma, "_GFP_SOMA_", out_dir)));
            if let Some(dapi) = &dapi {
                units.push((Channel::Dapi, rgb_overlay(settings, dapi, &label, "_DAPI_LABEL_", out_dir)));
                units.push((Channel::Gfp, rgb_overlay(settings, gfp, dapi, "_GFP_DAPI_", out_dir)));
            }
        }

        self.debug_pass(run, Stage::Segmentation, units)
    }

    fn debug_tracing(&mut self, run: &mut DatasetRun) -> Result<(), DatasetError> {
        if !self.config.stages.tracing.debug || !run.registry.is_active(Channel::Gfp) {
            return Ok(());
        }
        let invocation = ToolInvocation::new(Tool::ProjectionFloat, &self.config.tools)
            .path_arg(&run.paths.trace_temp.join("GFP_MNT_PRE"))
            .path_arg(&run.paths.trace_debug)
            .arg("ORG")
            .arg("NRRD");
        self.debug_pass(run, Stage::Tracing, vec![(Channel::Gfp, invocation)])
    }
}

/// GFP's 8-bit artifact if GFP is still active
fn gfp_8bit(run: &DatasetRun) -> Option<&str> {
    if !run.registry.is_active(Channel::Gfp) {
        return None;
    }
    run.lineages
        .get(&Channel::Gfp)
        .and_then(|lineage| lineage.artifact(StageTag::Rescaled8Bit))
}

fn rgb_overlay(
    settings: &ToolSettings,
    first: &str,
    second: &str,
    label: &str,
    out_dir: &Path,
) -> ToolInvocation {
    ToolInvocation::new(Tool::ProjectionRgb, settings)
        .arg(first)
        .arg(second)
        .arg(label)
        .path_arg(out_dir)
}

fn invoke_for_channel<R: ToolRunner>(
    tools: &mut R,
    invocation: &ToolInvocation,
    log: &StageLog,
    channel: Channel,
) -> Result<(), ChannelFailure> {
    let exit = tools.run(invocation, log).map_err(|source| ChannelFailure::Launch {
        channel,
        tool: invocation.tool,
        source,
    })?;
    if exit.success() {
        Ok(())
    } else {
        Err(ChannelFailure::ToolFailed {
            channel,
            tool: invocation.tool,
            exit,
        })
    }
}

fn note(log: &StageLog, line: &str) {
    if let Err(e) = log.append(line) {
        warn!("Could not write to {}: {}", log.path().display(), e);
    }
}
