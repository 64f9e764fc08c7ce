//! One-shot decode of encoded narration bytes into raw PCM for the encoder.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::foundation::error::{FramecastError, FramecastResult};

/// Decode target sample rate.
pub(crate) const DECODE_SAMPLE_RATE: u32 = 48_000;
/// Decode target channel count.
pub(crate) const DECODE_CHANNELS: u16 = 2;

/// Decoded narration track: interleaved `f32` PCM.
#[derive(Clone, Debug)]
pub(crate) struct AudioTrack {
    pub(crate) samples: Vec<f32>,
    pub(crate) sample_rate: u32,
    pub(crate) channels: u16,
}

/// Decode caller-supplied encoded audio bytes to 48 kHz stereo f32 PCM.
///
/// One-shot: runs before streaming starts and never overlaps painting.
/// Failures are [`FramecastError::Audio`], downgraded to "no audio" by the
/// streaming renderer.
pub(crate) fn decode_audio_bytes(bytes: &[u8]) -> FramecastResult<AudioTrack> {
    if bytes.is_empty() {
        return Err(FramecastError::audio("audio byte buffer is empty"));
    }

    let mut child = Command::new("ffmpeg")
        .args([
            "-loglevel",
            "error",
            "-i",
            "pipe:0",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            &DECODE_CHANNELS.to_string(),
            "-ar",
            &DECODE_SAMPLE_RATE.to_string(),
            "pipe:1",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| FramecastError::audio(format!("failed to spawn ffmpeg for decode: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| FramecastError::audio("failed to open ffmpeg stdin (unexpected)"))?;
    let input = bytes.to_vec();
    let writer = std::thread::spawn(move || -> std::io::Result<()> {
        stdin.write_all(&input)?;
        Ok(())
    });

    let mut pcm_bytes = Vec::new();
    child
        .stdout
        .take()
        .ok_or_else(|| FramecastError::audio("failed to open ffmpeg stdout (unexpected)"))?
        .read_to_end(&mut pcm_bytes)
        .map_err(|e| FramecastError::audio(format!("failed to read decoded audio: {e}")))?;

    let mut stderr_bytes = Vec::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_end(&mut stderr_bytes);
    }

    let status = child
        .wait()
        .map_err(|e| FramecastError::audio(format!("failed to wait for ffmpeg decode: {e}")))?;
    // The writer hits a broken pipe when ffmpeg rejects the input early.
    let _ = writer.join();

    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr_bytes);
        return Err(FramecastError::audio(format!(
            "audio decode failed with status {}: {}",
            status,
            stderr.trim()
        )));
    }
    if pcm_bytes.is_empty() || !pcm_bytes.len().is_multiple_of(4) {
        return Err(FramecastError::audio(
            "audio decode produced no usable samples",
        ));
    }

    let samples = pcm_bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(AudioTrack {
        samples,
        sample_rate: DECODE_SAMPLE_RATE,
        channels: DECODE_CHANNELS,
    })
}

/// Write an interleaved track to a raw little-endian `.f32le` file.
pub(crate) fn write_track_to_f32le_file(track: &AudioTrack, out_path: &Path) -> FramecastResult<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            FramecastError::audio(format!(
                "failed to create audio output directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let mut bytes = Vec::<u8>::with_capacity(track.samples.len() * 4);
    for &sample in &track.samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes).map_err(|e| {
        FramecastError::audio(format!(
            "failed to write audio file '{}': {e}",
            out_path.display()
        ))
    })
}

/// Unique temp path for one run's decoded track.
pub(crate) fn temp_track_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "framecast_audio_{}_{}.f32le",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ))
}

/// Deletes the decoded-track temp file when the run ends, success or not.
pub(crate) struct TempFileGuard(pub(crate) Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
