//! Audio normalization.
//!
//! Every accepted voice message is decoded and re-encoded to a single output
//! format before storage: 16-bit little-endian PCM WAV, channel count and
//! sample rate preserved from the source. The whole pipeline runs in memory;
//! callers only see either a complete WAV byte buffer or a `Decode` error.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{RelayError, RelayResult};

/// File extension hints for the probe, by declared MIME type.
fn extension_hint(mime: &str) -> Option<&'static str> {
    match mime {
        "audio/mpeg" => Some("mp3"),
        "audio/wav" => Some("wav"),
        "audio/ogg" => Some("ogg"),
        "audio/aac" => Some("aac"),
        "audio/x-m4a" => Some("m4a"),
        _ => None,
    }
}

/// Decode `bytes` (any allow-listed container/codec) and re-encode as
/// 16-bit PCM WAV. Fails with `Decode` on any probe, decode, or encode
/// error, and on streams that yield no audio frames.
pub fn transcode_to_wav(bytes: &[u8], declared_mime: &str) -> RelayResult<Vec<u8>> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint(declared_mime) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| RelayError::Decode(format!("unrecognized audio container: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| RelayError::Decode("no audio track in payload".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| RelayError::Decode(format!("unsupported codec: {e}")))?;

    let mut samples: Vec<i16> = Vec::new();
    let mut channels: u16 = 0;
    let mut sample_rate: u32 = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // End of stream surfaces as an UnexpectedEof I/O error.
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(RelayError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| RelayError::Decode(e.to_string()))?;

        let spec = *decoded.spec();
        channels = spec.channels.count() as u16;
        sample_rate = spec.rate;

        let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if samples.is_empty() || channels == 0 || sample_rate == 0 {
        return Err(RelayError::Decode("empty audio stream".to_string()));
    }

    encode_wav(&samples, channels, sample_rate)
}

/// Write interleaved 16-bit samples into an in-memory WAV container.
fn encode_wav(samples: &[i16], channels: u16, sample_rate: u32) -> RelayResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| RelayError::Decode(format!("wav encode: {e}")))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| RelayError::Decode(format!("wav encode: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| RelayError::Decode(format!("wav encode: {e}")))?;
    }

    Ok(cursor.into_inner())
}
