//! Camera stream pipeline allocator.
//!
//! Bookkeeping for streaming a set of USB camera devices to fixed endpoints:
//! a fixed number of pipelines, each optionally assigned one camera device.
//! Several pipelines may share a device; a device's source is closed only
//! when the last pipeline using it lets go. The capture/render machinery is
//! supplied externally behind [`VideoBackend`]; the crate ships a simulated
//! backend so the process runs without camera hardware.

use std::collections::HashSet;

use tracing::{info, warn};

/// Externally supplied capture/render layer.
pub trait VideoBackend {
    type Source;
    type Output;

    /// Opens a camera device as a video source.
    fn open_source(&mut self, device: usize) -> Result<Self::Source, &'static str>;

    /// Opens a stream output to an endpoint.
    fn open_output(&mut self, endpoint: &str) -> Result<Self::Output, &'static str>;

    /// Captures one frame and renders it to the output. False on failure.
    fn capture_and_render(&mut self, source: &mut Self::Source, output: &mut Self::Output) -> bool;
}

struct Pipeline<O> {
    device: Option<usize>,
    endpoint: String,
    output: Option<O>,
}

/// Manages the assignment of camera devices to stream pipelines.
pub struct PipelineManager<B: VideoBackend> {
    backend: B,
    pipelines: Vec<Pipeline<B::Output>>,
    sources: Vec<Option<B::Source>>,
    max_device_id: usize,
}

impl<B: VideoBackend> PipelineManager<B> {
    pub fn new(backend: B, endpoints: &[String], max_device_id: usize) -> Self {
        let pipelines = endpoints
            .iter()
            .map(|endpoint| Pipeline {
                device: None,
                endpoint: endpoint.clone(),
                output: None,
            })
            .collect();
        let sources = (0..max_device_id).map(|_| None).collect();
        Self { backend, pipelines, sources, max_device_id }
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Current assignment: streaming device per pipeline, `-1` for none.
    pub fn active(&self) -> Vec<i32> {
        self.pipelines
            .iter()
            .map(|p| p.device.map_or(-1, |d| d as i32))
            .collect()
    }

    /// Reconciles pipeline assignments with a request. Requests beyond the
    /// pipeline count are ignored; an unopenable device leaves its pipeline
    /// stopped. Returns the resulting assignment.
    pub fn change_cameras(&mut self, requested: &[i32]) -> Vec<i32> {
        for index in 0..self.pipelines.len() {
            let want = requested.get(index).copied().unwrap_or(-1);
            let current = self.pipelines[index].device.map_or(-1, |d| d as i32);
            if want == current {
                continue;
            }

            // Let go of the old device, closing its source if this was the
            // last pipeline using it
            if let Some(old) = self.pipelines[index].device.take() {
                if self.device_unused(old) {
                    self.sources[old] = None;
                }
            }

            if want < 0 {
                info!(pipeline = index, "stream stopped");
                continue;
            }
            let device = want as usize;
            if device >= self.max_device_id {
                warn!(pipeline = index, device, "camera device number out of range");
                continue;
            }

            if self.sources[device].is_none() {
                match self.backend.open_source(device) {
                    Ok(source) => self.sources[device] = Some(source),
                    Err(err) => {
                        warn!(pipeline = index, device, err, "unable to open camera device");
                        continue;
                    }
                }
            }

            // Recreate the output in case the device resolution changed
            match self.backend.open_output(&self.pipelines[index].endpoint) {
                Ok(output) => self.pipelines[index].output = Some(output),
                Err(err) => {
                    warn!(
                        pipeline = index,
                        endpoint = %self.pipelines[index].endpoint,
                        err,
                        "unable to open stream output"
                    );
                    if self.device_unused(device) {
                        self.sources[device] = None;
                    }
                    continue;
                }
            }

            self.pipelines[index].device = Some(device);
            info!(pipeline = index, device, endpoint = %self.pipelines[index].endpoint, "stream started");
        }

        self.active()
    }

    /// One pass over every streaming pipeline: capture and render a frame.
    /// A device whose capture fails is torn down on every pipeline using it.
    pub fn update_streams(&mut self) {
        let mut failed_devices: Vec<usize> = Vec::new();

        let Self { backend, pipelines, sources, .. } = self;
        for pipeline in pipelines.iter_mut() {
            let Some(device) = pipeline.device else { continue };
            if failed_devices.contains(&device) {
                continue;
            }
            let ok = match (sources[device].as_mut(), pipeline.output.as_mut()) {
                (Some(source), Some(output)) => backend.capture_and_render(source, output),
                _ => false,
            };
            if !ok {
                failed_devices.push(device);
            }
        }

        for device in failed_devices {
            warn!(device, "camera capture failed; stopping its streams");
            self.drop_device(device);
        }
    }

    /// Stops every pipeline streaming `device` and closes its source.
    fn drop_device(&mut self, device: usize) {
        self.sources[device] = None;
        for pipeline in &mut self.pipelines {
            if pipeline.device == Some(device) {
                pipeline.device = None;
            }
        }
    }

    fn device_unused(&self, device: usize) -> bool {
        !self.pipelines.iter().any(|p| p.device == Some(device))
    }
}

/// Simulated capture/render backend.
#[derive(Debug, Default)]
pub struct SimVideoBackend {
    present: HashSet<usize>,
    failing: HashSet<usize>,
}

#[derive(Debug)]
pub struct SimSource {
    pub device: usize,
}

#[derive(Debug)]
pub struct SimOutput {
    pub endpoint: String,
}

impl SimVideoBackend {
    /// Backend with camera devices `0..devices` present.
    pub fn with_devices(devices: usize) -> Self {
        Self {
            present: (0..devices).collect(),
            failing: HashSet::new(),
        }
    }

    /// Makes a device start failing captures, as an unplugged camera would.
    pub fn fail_device(&mut self, device: usize) {
        self.failing.insert(device);
    }

    pub fn restore_device(&mut self, device: usize) {
        self.failing.remove(&device);
    }
}

impl VideoBackend for SimVideoBackend {
    type Source = SimSource;
    type Output = SimOutput;

    fn open_source(&mut self, device: usize) -> Result<SimSource, &'static str> {
        if self.present.contains(&device) && !self.failing.contains(&device) {
            Ok(SimSource { device })
        } else {
            Err("no such camera device")
        }
    }

    fn open_output(&mut self, endpoint: &str) -> Result<SimOutput, &'static str> {
        Ok(SimOutput { endpoint: endpoint.to_owned() })
    }

    fn capture_and_render(&mut self, source: &mut SimSource, _output: &mut SimOutput) -> bool {
        !self.failing.contains(&source.device)
    }
}
