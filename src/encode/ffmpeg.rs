use std::io::Read;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread::JoinHandle;

use crate::encode::{Codec, CodecDescriptor, EncodedChunk, EncoderConfig, StreamEncoder};
use crate::foundation::{
    core::FrameIndex,
    error::{FramecastError, FramecastResult},
    math::flatten_premul_over_bg_to_opaque_rgba8,
};

/// Read size for the stdout chunk drain.
const CHUNK_READ_BYTES: usize = 64 * 1024;

/// Return `true` when the system `ffmpeg` binary is on `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Probe whether a named ffmpeg encoder is usable.
pub fn encoder_available(name: &str) -> bool {
    let Ok(out) = Command::new("ffmpeg")
        .args(["-hide_banner", "-h", &format!("encoder={name}")])
        .stdin(Stdio::null())
        .output()
    else {
        return false;
    };
    if !out.status.success() {
        return false;
    }
    // ffmpeg reports unknown encoders on a successful exit, so the probe has
    // to inspect the output text.
    let text = String::from_utf8_lossy(&out.stdout);
    let err_text = String::from_utf8_lossy(&out.stderr);
    !text.contains("Unknown encoder") && !err_text.contains("Unknown encoder")
}

/// Streaming encoder that spawns the system `ffmpeg`.
///
/// Raw flattened RGBA frames go to ffmpeg's stdin; the containerized stream is
/// drained from stdout on a reader thread as ordered [`EncodedChunk`]s. We use
/// the system binary rather than native bindings to avoid FFmpeg dev
/// header/lib requirements.
pub struct FfmpegStreamEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout_drain: Option<JoinHandle<std::io::Result<()>>>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    chunk_rx: Option<mpsc::Receiver<EncodedChunk>>,

    scratch: Vec<u8>,
    bg_rgba: [u8; 4],
    descriptor: Option<CodecDescriptor>,
    last_idx: Option<FrameIndex>,
}

impl Default for FfmpegStreamEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegStreamEncoder {
    /// Create an idle encoder; [`StreamEncoder::begin`] spawns the process.
    pub fn new() -> Self {
        Self {
            child: None,
            stdin: None,
            stdout_drain: None,
            stderr_drain: None,
            chunk_rx: None,
            scratch: Vec::new(),
            bg_rgba: [0, 0, 0, 255],
            descriptor: None,
            last_idx: None,
        }
    }

    fn negotiate(&self, cfg: &EncoderConfig) -> FramecastResult<Codec> {
        for &codec in &cfg.codec_preference {
            let available = match codec {
                Codec::Vp9 => encoder_available("libvpx-vp9"),
                Codec::H264 => encoder_available("libx264"),
                Codec::Unconstrained => true,
            };
            if available {
                tracing::debug!(?codec, "negotiated encoder codec");
                return Ok(codec);
            }
            tracing::debug!(?codec, "preferred codec unavailable, trying next");
        }
        Err(FramecastError::encode(
            "encoder failed to start: no supported codec after full fallback",
        ))
    }

    fn drain_chunks(&mut self) -> Vec<EncodedChunk> {
        let mut chunks = Vec::new();
        if let Some(rx) = self.chunk_rx.take() {
            while let Ok(chunk) = rx.recv() {
                chunks.push(chunk);
            }
        }
        chunks
    }
}

impl StreamEncoder for FfmpegStreamEncoder {
    fn begin(&mut self, cfg: &EncoderConfig) -> FramecastResult<()> {
        cfg.validate()?;

        if !is_ffmpeg_on_path() {
            return Err(FramecastError::encode(
                "ffmpeg is required for video encoding, but was not found on PATH",
            ));
        }

        let codec = self.negotiate(cfg)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Input 0: raw flattened RGBA frames at the run's frame rate.
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.canvas.width, cfg.canvas.height),
            "-r",
            &format!("{}/{}", cfg.fps.num, cfg.fps.den),
            "-i",
            "pipe:0",
        ]);

        // Input 1: optional decoded narration as raw f32le PCM.
        if let Some(audio) = cfg.audio.as_ref() {
            cmd.args([
                "-f",
                "f32le",
                "-ar",
                &audio.sample_rate.to_string(),
                "-ac",
                &audio.channels.to_string(),
                "-i",
            ])
            .arg(&audio.path);
        }

        let bitrate = format!("{}", cfg.bitrate_bps);
        let flush_ms = cfg.flush_interval.as_millis().max(1).to_string();
        let flush_us = (cfg.flush_interval.as_micros().max(1)).to_string();
        match codec {
            Codec::Vp9 => {
                cmd.args(["-c:v", "libvpx-vp9", "-b:v", &bitrate, "-deadline", "realtime"]);
                if cfg.audio.is_some() {
                    cmd.args(["-c:a", "libopus"]);
                }
                // Bound muxer buffering: start a new cluster at least once per
                // flush interval and flush packets as they complete.
                cmd.args([
                    "-f",
                    "webm",
                    "-cluster_time_limit",
                    &flush_ms,
                    "-flush_packets",
                    "1",
                ]);
            }
            Codec::H264 => {
                cmd.args([
                    "-c:v",
                    "libx264",
                    "-preset",
                    "veryfast",
                    "-pix_fmt",
                    "yuv420p",
                    "-b:v",
                    &bitrate,
                ]);
                if cfg.audio.is_some() {
                    cmd.args(["-c:a", "aac"]);
                }
                // Fragmented MP4 so the stream is chunkable over a pipe.
                cmd.args([
                    "-f",
                    "mp4",
                    "-movflags",
                    "frag_keyframe+empty_moov",
                    "-frag_duration",
                    &flush_us,
                    "-flush_packets",
                    "1",
                ]);
            }
            Codec::Unconstrained => {
                cmd.args(["-b:v", &bitrate, "-f", "matroska", "-flush_packets", "1"]);
            }
        }
        if cfg.audio.is_some() {
            cmd.arg("-shortest");
        }
        cmd.arg("pipe:1");

        let mut child = cmd.spawn().map_err(|e| {
            FramecastError::encode(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FramecastError::encode("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| FramecastError::encode("failed to open ffmpeg stdout (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| FramecastError::encode("failed to open ffmpeg stderr (unexpected)"))?;

        // Chunk drain: emission order is exactly read order on this single
        // reader, preserved by the channel.
        let (tx, rx) = mpsc::channel::<EncodedChunk>();
        let stdout_drain = std::thread::spawn(move || -> std::io::Result<()> {
            let mut buf = vec![0u8; CHUNK_READ_BYTES];
            loop {
                let n = stdout.read(&mut buf)?;
                if n == 0 {
                    return Ok(());
                }
                if tx
                    .send(EncodedChunk {
                        data: buf[..n].to_vec(),
                    })
                    .is_err()
                {
                    return Ok(());
                }
            }
        });
        let stderr_drain = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        self.scratch = vec![0u8; cfg.canvas.frame_byte_len()];
        self.bg_rgba = cfg.bg_rgba;
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stdout_drain = Some(stdout_drain);
        self.stderr_drain = Some(stderr_drain);
        self.chunk_rx = Some(rx);
        self.descriptor = Some(codec.descriptor());
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame_premul_rgba: &[u8]) -> FramecastResult<()> {
        if self.child.is_none() {
            return Err(FramecastError::encode("ffmpeg encoder not started"));
        }
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(FramecastError::encode(
                "encoder received out-of-order frame index",
            ));
        }
        if frame_premul_rgba.len() != self.scratch.len() {
            return Err(FramecastError::validation(
                "frame byte length mismatch with canvas dimensions",
            ));
        }
        self.last_idx = Some(idx);

        flatten_premul_over_bg_to_opaque_rgba8(&mut self.scratch, frame_premul_rgba, self.bg_rgba)?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(FramecastError::encode("ffmpeg encoder is already finalized"));
        };

        use std::io::Write as _;
        stdin.write_all(&self.scratch).map_err(|e| {
            FramecastError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    fn finish(&mut self) -> FramecastResult<Vec<EncodedChunk>> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| FramecastError::encode("ffmpeg encoder not started"))?;

        let status = child.wait().map_err(|e| {
            FramecastError::encode(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;

        if let Some(handle) = self.stdout_drain.take() {
            handle
                .join()
                .map_err(|_| FramecastError::encode("ffmpeg stdout drain thread panicked"))?
                .map_err(|e| FramecastError::encode(format!("ffmpeg stdout read failed: {e}")))?;
        }
        let chunks = self.drain_chunks();

        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| FramecastError::encode("ffmpeg stderr drain thread panicked"))?
                .unwrap_or_default(),
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(FramecastError::encode(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        if chunks.is_empty() {
            return Err(FramecastError::encode(
                "ffmpeg produced no output (no frames were encoded)",
            ));
        }

        Ok(chunks)
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                tracing::warn!("failed to kill ffmpeg during abort: {e}");
            }
            let _ = child.wait();
        }
        if let Some(handle) = self.stdout_drain.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
        let _ = self.drain_chunks();
        self.last_idx = None;
    }

    fn descriptor(&self) -> Option<CodecDescriptor> {
        self.descriptor
    }
}

impl Drop for FfmpegStreamEncoder {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.abort();
        }
    }
}
