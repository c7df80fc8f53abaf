//! File source element.

use super::super::task::{StreamingTask, TaskControl};
use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{
    ElementContext, ElementImpl, FlowError, PadTemplate, PropertyKind, PropertySpec, PropertyValue,
    StateChange, StateChangeSuccess,
};
use crate::error::{Error, Result};
use crate::event::Event;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Default read size.
const DEFAULT_BLOCKSIZE: usize = 4096;

#[derive(Debug)]
struct Settings {
    location: Option<PathBuf>,
    blocksize: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            location: None,
            blocksize: DEFAULT_BLOCKSIZE,
        }
    }
}

/// A source element that reads from a file.
///
/// The file is opened on READY to PAUSED, so a missing file fails that
/// transition. Buffers carry their byte offset in the file and no
/// timestamps; end-of-stream follows the last chunk.
///
/// # Properties
///
/// | Name | Type | Default |
/// |------|------|---------|
/// | `location` | string | required |
/// | `blocksize` | int | 4096 |
#[derive(Default)]
pub struct FileSrc {
    settings: Mutex<Settings>,
    task: Mutex<Option<StreamingTask>>,
}

impl FileSrc {
    /// Create a file source with no location set.
    pub fn new() -> Self {
        Self::default()
    }

    fn settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self, ctx: &ElementContext) -> Result<()> {
        let (path, blocksize) = {
            let settings = self.settings();
            let path = settings.location.clone().ok_or_else(|| Error::StateChange {
                element: ctx.name().to_string(),
                reason: "no location set".into(),
            })?;
            (path, settings.blocksize.max(1))
        };
        let file = File::open(&path).map_err(|err| Error::StateChange {
            element: ctx.name().to_string(),
            reason: format!("could not open {} for reading: {err}", path.display()),
        })?;
        debug!(element = %ctx.name(), path = %path.display(), "opened file");

        let ctx = ctx.clone();
        let task = StreamingTask::spawn(&format!("{}:src", ctx.name()), move |control| {
            read_loop(file, blocksize, &ctx, &control);
        })?;
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(())
    }

    fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.stop();
        }
    }
}

fn read_loop(mut file: File, blocksize: usize, ctx: &ElementContext, control: &TaskControl) {
    let mut offset = 0u64;
    loop {
        if control.is_stopped() {
            return;
        }
        let mut chunk = vec![0u8; blocksize];
        let read = match file.read(&mut chunk) {
            Ok(0) => {
                debug!(element = %ctx.name(), bytes = offset, "end of file");
                ctx.push_event(Event::Eos);
                return;
            }
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                ctx.post_error("could not read from file", Some(err.to_string()));
                return;
            }
        };
        chunk.truncate(read);
        trace!(element = %ctx.name(), offset, len = read, "read chunk");
        match ctx.push("src", Buffer::new(chunk).with_offset(offset)) {
            Ok(()) => offset += read as u64,
            Err(FlowError::NotLinked) => {
                ctx.post_error(
                    "internal data stream error",
                    Some(format!("streaming stopped, reason {}", FlowError::NotLinked)),
                );
                return;
            }
            Err(reason) => {
                debug!(element = %ctx.name(), %reason, "pausing task");
                return;
            }
        }
    }
}

impl ElementImpl for FileSrc {
    fn pad_templates(&self) -> Vec<PadTemplate> {
        vec![PadTemplate::src(Caps::new_any())]
    }

    fn properties(&self) -> Vec<PropertySpec> {
        vec![
            PropertySpec::required("location", PropertyKind::String, "Path of the file to read"),
            PropertySpec::new("blocksize", PropertyKind::Int, DEFAULT_BLOCKSIZE as i64, "Bytes per buffer"),
        ]
    }

    fn set_property(&self, name: &str, value: &PropertyValue) -> Result<()> {
        let mut settings = self.settings();
        match name {
            "location" => settings.location = Some(PathBuf::from(value.as_string())),
            "blocksize" => settings.blocksize = crate::elements::blocksize(value)?,
            _ => {
                return Err(Error::UnknownProperty {
                    element: String::new(),
                    property: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn property(&self, name: &str) -> Option<PropertyValue> {
        let settings = self.settings();
        match name {
            "location" => settings
                .location
                .as_ref()
                .map(|p| PropertyValue::String(p.display().to_string())),
            "blocksize" => Some(PropertyValue::Integer(settings.blocksize as i64)),
            _ => None,
        }
    }

    fn set_uri(&self, uri: &str) -> Result<()> {
        let path = uri
            .strip_prefix("file://")
            .filter(|p| p.starts_with('/'))
            .ok_or_else(|| Error::InvalidUri(uri.to_string()))?;
        self.settings().location = Some(PathBuf::from(path));
        Ok(())
    }

    fn change_state(&self, ctx: &ElementContext, transition: StateChange) -> Result<StateChangeSuccess> {
        match transition {
            StateChange::READY_TO_PAUSED => self.start(ctx)?,
            StateChange::PAUSED_TO_READY => self.stop(),
            _ => {}
        }
        Ok(StateChangeSuccess::Success)
    }
}
