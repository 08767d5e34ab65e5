//! Getting PCM into the engine: file decoding, channel and rate conversion,
//! and re-chunking arbitrary-length captures into fixed frames.

use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Instant;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::IntentError;
use crate::{FRAME_LENGTH, SAMPLE_RATE};

/// Interleaved float samples as stored in a file.
struct Decoded {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

/// Decodes an audio file to mono 16-bit PCM at [`SAMPLE_RATE`].
pub fn load_pcm16<P: AsRef<Path>>(path: P) -> Result<Vec<i16>, IntentError> {
    let start = Instant::now();
    let path = path.as_ref();
    let decoded = decode_file(path)?;
    let pcm = prepare_pcm16(&decoded.samples, decoded.channels, decoded.sample_rate);
    log::info!(
        "Loaded {} engine samples from {} ({} ch, {} Hz) in {:?}",
        pcm.len(),
        path.display(),
        decoded.channels,
        decoded.sample_rate,
        start.elapsed()
    );
    Ok(pcm)
}

/// Turns interleaved float capture in any layout into engine PCM: mono,
/// [`SAMPLE_RATE`], 16-bit. Ready for [`FrameAssembler::push`].
pub fn prepare_pcm16(interleaved: &[f32], channels: usize, sample_rate: u32) -> Vec<i16> {
    let mono = downmix(interleaved, channels);
    if sample_rate == SAMPLE_RATE {
        to_pcm16(&mono)
    } else {
        to_pcm16(&resample_linear(&mono, sample_rate, SAMPLE_RATE))
    }
}

/// Averages interleaved channels into one. A trailing partial frame is dropped.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 | 1 => interleaved.to_vec(),
        n => interleaved
            .chunks_exact(n)
            .map(|frame| frame.iter().sum::<f32>() / n as f32)
            .collect(),
    }
}

fn decode_file(path: &Path) -> Result<Decoded, IntentError> {
    let audio_err = |what: &str, detail: String| {
        let mut msg = format!("{}: {what}", path.display());
        if !detail.is_empty() {
            msg.push_str(": ");
            msg.push_str(&detail);
        }
        IntentError::Audio(msg)
    };

    let stream = MediaSourceStream::new(Box::new(File::open(path)?), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let mut reader = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| audio_err("unrecognized format", e.to_string()))?
        .format;

    let track = reader
        .default_track()
        .ok_or_else(|| audio_err("no audio track", String::new()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut codec = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| audio_err("unsupported codec", e.to_string()))?;

    let mut samples = Vec::new();
    let mut channels = 0;
    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                log::warn!("Stopped reading {} early: {e}", path.display());
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let block = match codec.decode(&packet) {
            Ok(block) => block,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping corrupt packet in {}: {e}", path.display());
                continue;
            }
            Err(e) => return Err(audio_err("decode failed", e.to_string())),
        };
        let spec = *block.spec();
        let block_channels = spec.channels.count().max(1);
        if channels == 0 {
            channels = block_channels;
        } else if channels != block_channels {
            return Err(audio_err(
                "channel count changed",
                format!("{channels} -> {block_channels}"),
            ));
        }
        sample_rate.get_or_insert(spec.rate);

        let mut buffer = SampleBuffer::<f32>::new(block.capacity() as u64, spec);
        buffer.copy_interleaved_ref(block);
        samples.extend_from_slice(buffer.samples());
    }

    let sample_rate = sample_rate.ok_or_else(|| audio_err("missing sample rate", String::new()))?;
    Ok(Decoded {
        samples,
        channels: channels.max(1),
        sample_rate,
    })
}

/// Linear-interpolation resampler; adequate for speech-band input.
pub fn resample_linear(input: &[f32], from_sr: u32, to_sr: u32) -> Vec<f32> {
    let Some(&last) = input.last() else {
        return Vec::new();
    };
    if from_sr == 0 || to_sr == 0 {
        return Vec::new();
    }

    let ratio = f64::from(from_sr) / f64::from(to_sr);
    let out_len = (input.len() as f64 * f64::from(to_sr) / f64::from(from_sr)).ceil() as usize;
    (0..out_len.max(1))
        .map(|i| {
            let pos = i as f64 * ratio;
            let left = pos as usize;
            let t = (pos - left as f64) as f32;
            let a = input.get(left).copied().unwrap_or(last);
            let b = input.get(left + 1).copied().unwrap_or(a);
            a + (b - a) * t
        })
        .collect()
}

/// Converts `[-1, 1]` float samples to 16-bit PCM, clipping out-of-range values.
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
        .collect()
}

/// Re-chunks PCM pushed in arbitrary sizes into [`FRAME_LENGTH`] frames.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: VecDeque<i16>,
    frame: Vec<i16>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(FRAME_LENGTH * 4),
            frame: Vec::with_capacity(FRAME_LENGTH),
        }
    }

    /// Samples waiting for a full frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Appends `data` and hands every complete frame to `emit` in order.
    ///
    /// Stops early, leaving the rest buffered, as soon as `emit` returns
    /// `true` (typically: the session finalized). A frame `emit` fails on
    /// stays buffered.
    pub fn push<E>(
        &mut self,
        data: &[i16],
        mut emit: impl FnMut(&[i16]) -> Result<bool, E>,
    ) -> Result<bool, E> {
        self.buffer.extend(data);

        while self.buffer.len() >= FRAME_LENGTH {
            self.frame.clear();
            self.frame
                .extend(self.buffer.iter().take(FRAME_LENGTH).copied());
            let done = emit(&self.frame)?;
            self.buffer.drain(..FRAME_LENGTH);
            if done {
                return Ok(true);
            }
        }

        if self.buffer.capacity() > FRAME_LENGTH * 64 && self.buffer.len() < FRAME_LENGTH {
            self.buffer.shrink_to_fit();
        }
        Ok(false)
    }

    /// Emits whatever is buffered as one zero-padded frame.
    pub fn flush<E>(
        &mut self,
        mut emit: impl FnMut(&[i16]) -> Result<bool, E>,
    ) -> Result<bool, E> {
        if self.buffer.is_empty() {
            return Ok(false);
        }
        self.frame.clear();
        self.frame.extend(self.buffer.drain(..));
        self.frame.resize(FRAME_LENGTH, 0);
        emit(&self.frame)
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
