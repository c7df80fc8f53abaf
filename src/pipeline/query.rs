//! Position, duration and seeking.

use super::{ElementId, Pipeline};
use crate::clock::ClockTime;
use crate::element::State;
use crate::error::{Error, MisuseError, Result};
use crate::event::{Event, Query, SeekEvent, SeekFlags};
use tracing::{debug, info};

/// Answer to a seeking query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekingInfo {
    /// Whether the stream can be seeked.
    pub seekable: bool,
    /// Earliest seekable position.
    pub start: ClockTime,
    /// Latest seekable position, if known.
    pub end: Option<ClockTime>,
}

impl Pipeline {
    fn require_streaming(&self) -> Result<()> {
        if self.current < State::Paused {
            return Err(Error::NotReady(self.current));
        }
        Ok(())
    }

    /// Ask elements in order, returning the first answer.
    fn ask(&self, ids: impl IntoIterator<Item = ElementId>, query: &mut Query) -> bool {
        ids.into_iter()
            .filter_map(|id| self.graph.get(id))
            .any(|element| element.query(query))
    }

    /// Current stream position, asked from the sinks first and then from
    /// the sources. `Ok(None)` if no element knows.
    pub fn query_position(&self) -> Result<Option<ClockTime>> {
        self.require_streaming()?;
        let mut query = Query::position();
        let answered = self.ask(self.graph.sinks(), &mut query) || self.ask(self.graph.sources(), &mut query);
        Ok(match query {
            Query::Position(position) if answered => position,
            _ => None,
        })
    }

    /// Stream duration. Cached until an element posts duration-changed.
    pub fn query_duration(&mut self) -> Result<Option<ClockTime>> {
        self.require_streaming()?;
        if let Some(cached) = self.duration_cache {
            return Ok(cached);
        }
        let mut query = Query::duration();
        let answered = self.ask(self.graph.sources(), &mut query) || self.ask(self.graph.sinks(), &mut query);
        let duration = match query {
            Query::Duration(duration) if answered => duration,
            _ => None,
        };
        if answered {
            self.duration_cache = Some(duration);
        }
        Ok(duration)
    }

    /// Whether and where the stream can be seeked.
    pub fn query_seeking(&self) -> Result<SeekingInfo> {
        self.require_streaming()?;
        let mut query = Query::seeking();
        if self.ask(self.graph.sources(), &mut query) {
            if let Query::Seeking { seekable, start, end } = query {
                return Ok(SeekingInfo { seekable, start, end });
            }
        }
        Ok(SeekingInfo {
            seekable: false,
            start: ClockTime::ZERO,
            end: None,
        })
    }

    /// Seek to `position`.
    ///
    /// A flushing seek completes asynchronously: the pipeline posts
    /// async-done once the sinks have received data from the new position,
    /// and no other seek is accepted until that message has been drained.
    pub fn seek(&mut self, position: ClockTime, flags: SeekFlags) -> Result<()> {
        self.require_streaming()?;
        if self.seek_pending {
            return Err(MisuseError::SeekInProgress.into());
        }
        let seek = SeekEvent { position, flags };
        let mut handled = false;
        for id in self.graph.sources() {
            if let Some(element) = self.graph.get(id) {
                handled |= element.send_event(Event::Seek(seek));
            }
        }
        if !handled {
            debug!(pipeline = %self.name, "no source handled the seek");
            return Err(Error::NotSeekable);
        }
        info!(pipeline = %self.name, %position, ?flags, "seek");
        self.seek_pending = true;
        if seek.is_flushing() {
            self.reset_eos();
        } else {
            // Applied in place: nothing prerolls again, so the seek is
            // complete as soon as the sources took it.
            self.complete_seek();
        }
        Ok(())
    }

    /// Flushing key-unit seek.
    pub fn seek_simple(&mut self, position: ClockTime) -> Result<()> {
        self.seek(position, SeekFlags::FLUSH | SeekFlags::KEY_UNIT)
    }

    /// Whether a seek is waiting for its async-done to be drained.
    pub fn is_seek_pending(&self) -> bool {
        self.seek_pending
    }

    /// Ask the sources to finish: every source sends end-of-stream
    /// downstream. Returns `false` if no source took the event.
    pub fn send_eos(&mut self) -> bool {
        let mut sent = false;
        for id in self.graph.sources() {
            let Some(element) = self.graph.get(id) else {
                continue;
            };
            sent |= element.send_event(Event::Eos) || element.core().context().push_event(Event::Eos);
        }
        debug!(pipeline = %self.name, sent, "end of stream requested");
        sent
    }
}
