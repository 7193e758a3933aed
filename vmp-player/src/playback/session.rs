//! Loaded movie session
//!
//! A [`MovieSession`] exists only when a movie is fully loaded: open stream,
//! all buffers and a live decoder session. Building one either succeeds
//! completely or drops whatever was acquired so far.
//!
//! Field order is drop order: the decoder is destroyed before its buffers
//! are released, and the stream is closed last.

use crate::decoder::{DecodeContext, DecoderBackend, DecoderSession, SessionMemory, SessionSetup, StreamHeader};
use crate::error::LoadError;
use crate::playback::buffers::{BufferAllocator, SessionBuffers};
use crate::playback::params::DecodeParams;
use crate::playback::state::PlaybackState;
use std::ops::{Deref, DerefMut};
use tracing::{debug, info, warn};
use vmp_common::block::{BlockFile, BlockSource, FileId};

// ============================================================================
// Decoder handle
// ============================================================================

/// Owned decoder session, stopped and destroyed on drop
pub struct DecoderHandle {
    session: Option<Box<dyn DecoderSession>>,
}

impl DecoderHandle {
    pub fn new(session: Box<dyn DecoderSession>) -> Self {
        Self {
            session: Some(session),
        }
    }
}

impl Deref for DecoderHandle {
    type Target = dyn DecoderSession;

    fn deref(&self) -> &Self::Target {
        match &self.session {
            Some(session) => session.as_ref(),
            None => unreachable!("decoder session is only taken on drop"),
        }
    }
}

impl DerefMut for DecoderHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.session {
            Some(session) => session.as_mut(),
            None => unreachable!("decoder session is only taken on drop"),
        }
    }
}

impl Drop for DecoderHandle {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if session.status().is_progressing() {
                session.stop();
            }
            session.destroy();
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Everything held while a movie is loaded
pub struct MovieSession {
    decoder: DecoderHandle,
    buffers: SessionBuffers,
    stream: Box<dyn BlockFile>,
    header: StreamHeader,
    params: DecodeParams,
    name: String,
    file_id: FileId,
}

/// Create a decoder session over `stream` and read its header
fn create_decoder(
    backend: &dyn DecoderBackend,
    params: &DecodeParams,
    memory: SessionMemory<'_>,
    stream: &mut dyn BlockFile,
) -> Result<(DecoderHandle, StreamHeader), LoadError> {
    let setup = SessionSetup {
        work_size: memory.work.len(),
        ring_size: memory.ring.len(),
        pcm: params.pcm,
    };

    let session = backend
        .create_session(&setup, stream)
        .ok_or(LoadError::SessionCreateFailed)?;
    let mut decoder = DecoderHandle::new(session);

    decoder.set_color_depth(params.color_depth);
    decoder.preload_header(&mut DecodeContext { memory, stream });

    let header = decoder
        .header()
        .ok_or_else(|| LoadError::HeaderInvalid("stream has no header".to_string()))?;
    if header.width == 0 || header.height == 0 {
        return Err(LoadError::HeaderInvalid(format!(
            "zero dimension {}x{}",
            header.width, header.height
        )));
    }

    Ok((decoder, header))
}

fn open_stream(source: &dyn BlockSource, name: &str, id: FileId) -> Result<Box<dyn BlockFile>, LoadError> {
    source.open(id).map_err(|e| {
        warn!("Could not open movie '{}' ({}): {}", name, id, e);
        LoadError::ResourceNotFound {
            name: name.to_string(),
        }
    })
}

impl MovieSession {
    /// Open `name` and build a complete session
    pub fn open(
        name: &str,
        params: &DecodeParams,
        backend: &dyn DecoderBackend,
        source: &dyn BlockSource,
        allocator: &BufferAllocator<'_>,
    ) -> Result<Self, LoadError> {
        let file_id = source.resolve(name).ok_or_else(|| LoadError::ResourceNotFound {
            name: name.to_string(),
        })?;
        let mut stream = open_stream(source, name, file_id)?;
        debug!("Opened movie '{}' ({}, {} bytes)", name, file_id, stream.info().size);

        let mut stream_buffers = allocator.stream_buffers(params)?;
        let (mut decoder, header) =
            create_decoder(backend, params, stream_buffers.memory(), stream.as_mut())?;

        let decode = allocator.decode_buffer(params, header.resolution())?;
        let buffers = stream_buffers.with_decode(decode);
        decoder.set_decode_target(buffers.decode.len(), params.color_depth.stride(header.width));

        Ok(Self {
            decoder,
            buffers,
            stream,
            header,
            params: params.clone(),
            name: name.to_string(),
            file_id,
        })
    }

    /// Replace decoder and stream with fresh ones over the same buffers
    ///
    /// The old decoder session is destroyed and the file closed before the
    /// file is re-opened by id. On failure every buffer is released.
    pub fn rebuild(self, backend: &dyn DecoderBackend, source: &dyn BlockSource) -> Result<Self, LoadError> {
        let MovieSession {
            decoder,
            mut buffers,
            stream,
            header,
            params,
            name,
            file_id,
        } = self;

        drop(decoder);
        drop(stream);

        let mut stream = open_stream(source, &name, file_id)?;
        let (mut decoder, new_header) =
            create_decoder(backend, &params, buffers.memory(), stream.as_mut())?;

        if new_header.resolution() != header.resolution() {
            return Err(LoadError::HeaderInvalid(format!(
                "resolution changed from {} to {}",
                header.resolution(),
                new_header.resolution()
            )));
        }
        decoder.set_decode_target(buffers.decode.len(), params.color_depth.stride(new_header.width));

        info!("Rebuilt session for '{}'", name);
        Ok(Self {
            decoder,
            buffers,
            stream,
            header: new_header,
            params,
            name,
            file_id,
        })
    }

    /// Run one decode step with the session's memory and stream
    pub fn advance(&mut self) {
        self.decoder.advance(&mut DecodeContext {
            memory: self.buffers.memory(),
            stream: self.stream.as_mut(),
        });
    }

    pub fn status(&self) -> PlaybackState {
        self.decoder.status()
    }

    pub fn decoder(&self) -> &dyn DecoderSession {
        &*self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut dyn DecoderSession {
        &mut *self.decoder
    }

    pub fn header(&self) -> StreamHeader {
        self.header
    }

    pub fn params(&self) -> &DecodeParams {
        &self.params
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Decoded frame buffer
    pub fn frame(&self) -> &[u8] {
        self.buffers.frame()
    }

    pub fn buffers(&self) -> &SessionBuffers {
        &self.buffers
    }
}
