use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::time::Duration;

pub const WAV_HEADER_LEN: usize = 44;

/// Wraps raw little-endian PCM in a canonical 44-byte WAV header.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    write_header(&mut out, pcm.len() as u32, sample_rate, channels, bits_per_sample);
    out.extend_from_slice(pcm);
    out
}

fn write_header(
    out: &mut Vec<u8>,
    data_size: u32,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
) {
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * block_align as u32;

    // RIFF [4] + Size [4] + WAVE [4]
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_size).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    // fmt chunk, PCM (1)
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub bits_per_sample: u16,
    pub data_offset: u64,
    pub data_size: u32,
}

/// Walks the RIFF chunks of an in-memory WAV file until the data chunk.
pub fn scan_wav(bytes: &[u8]) -> Result<WavInfo> {
    let mut f = Cursor::new(bytes);

    let mut id = [0u8; 4];
    f.read_exact(&mut id)?;
    if &id != b"RIFF" {
        return Err(anyhow!("Not a RIFF file"));
    }

    // Skip File Size
    f.seek(SeekFrom::Current(4))?;

    f.read_exact(&mut id)?;
    if &id != b"WAVE" {
        return Err(anyhow!("Not a WAVE file"));
    }

    let mut fmt: Option<(u16, u32, u32, u16)> = None;

    loop {
        let mut chunk_id = [0u8; 4];
        let n = f.read(&mut chunk_id)?;
        if n == 0 {
            break;
        }
        if n < 4 {
            return Err(anyhow!("Unexpected EOF reading chunk ID"));
        }

        let mut size_buf = [0u8; 4];
        f.read_exact(&mut size_buf)?;
        let chunk_size = u32::from_le_bytes(size_buf);

        let remaining = (bytes.len() as u64).saturating_sub(f.position());

        if &chunk_id == b"fmt " {
            if chunk_size as u64 > remaining {
                return Err(anyhow!("Truncated fmt chunk"));
            }
            let mut buf = vec![0u8; chunk_size as usize];
            f.read_exact(&mut buf).context("Truncated fmt chunk")?;
            if buf.len() < 16 {
                return Err(anyhow!("fmt chunk too short"));
            }
            let channels = u16::from_le_bytes([buf[2], buf[3]]);
            let sample_rate = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
            let byte_rate = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
            let bits = u16::from_le_bytes([buf[14], buf[15]]);
            fmt = Some((channels, sample_rate, byte_rate, bits));
        } else if &chunk_id == b"data" {
            let (channels, sample_rate, byte_rate, bits_per_sample) =
                fmt.ok_or_else(|| anyhow!("data chunk before fmt chunk"))?;
            return Ok(WavInfo {
                channels,
                sample_rate,
                byte_rate,
                bits_per_sample,
                data_offset: f.stream_position()?,
                data_size: chunk_size,
            });
        } else {
            f.seek(SeekFrom::Current(chunk_size as i64))?;
        }
    }

    Err(anyhow!("Missing data chunk"))
}

pub fn wav_duration(bytes: &[u8]) -> Result<Duration> {
    let info = scan_wav(bytes)?;
    if info.byte_rate == 0 {
        return Err(anyhow!("WAV byte rate is zero"));
    }
    Ok(Duration::from_secs_f64(info.data_size as f64 / info.byte_rate as f64))
}

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Returns the mime type and payload of a base64 `data:` URI.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| anyhow!("Not a data URI"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| anyhow!("Malformed data URI"))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| anyhow!("Only base64 data URIs are supported"))?;
    let bytes = STANDARD.decode(payload).context("Invalid base64 payload")?;
    Ok((mime.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_to_wav_header_layout() -> Result<()> {
        let pcm = vec![0u8; 48_000];
        let wav = pcm_to_wav(&pcm, 24_000, 1, 16);

        assert_eq!(wav.len(), WAV_HEADER_LEN + pcm.len());
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into()?), 36 + 48_000);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(wav[16..20].try_into()?), 16);
        assert_eq!(u16::from_le_bytes(wav[20..22].try_into()?), 1);
        assert_eq!(u16::from_le_bytes(wav[22..24].try_into()?), 1);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into()?), 24_000);
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into()?), 48_000);
        assert_eq!(u16::from_le_bytes(wav[32..34].try_into()?), 2);
        assert_eq!(u16::from_le_bytes(wav[34..36].try_into()?), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into()?), 48_000);
        Ok(())
    }

    #[test]
    fn test_wav_duration() -> Result<()> {
        // 1.5 seconds of 16-bit mono at 24kHz
        let wav = pcm_to_wav(&vec![0u8; 72_000], 24_000, 1, 16);
        let info = scan_wav(&wav)?;
        assert_eq!(info.data_offset, 44);
        assert_eq!(wav_duration(&wav)?, Duration::from_millis(1500));
        Ok(())
    }

    #[test]
    fn test_scan_wav_skips_unknown_chunks() -> Result<()> {
        let base = pcm_to_wav(&[1, 2, 3, 4], 24_000, 1, 16);
        let mut wav = base[..36].to_vec();
        wav.extend_from_slice(b"LIST");
        wav.extend_from_slice(&4u32.to_le_bytes());
        wav.extend_from_slice(b"info");
        wav.extend_from_slice(&base[36..]);

        let info = scan_wav(&wav)?;
        assert_eq!(info.data_size, 4);
        assert_eq!(info.data_offset, 56);
        Ok(())
    }

    #[test]
    fn test_scan_wav_rejects_garbage() {
        assert!(scan_wav(b"not audio at all").is_err());
    }

    #[test]
    fn test_oversized_fmt_chunk_rejected() {
        let mut wav = pcm_to_wav(&[0, 0], 24_000, 1, 16);
        wav[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = scan_wav(&wav).unwrap_err();
        assert!(err.to_string().contains("Truncated fmt chunk"));
    }

    #[test]
    fn test_data_uri() -> Result<()> {
        let uri = data_uri("audio/wav", b"RIFF");
        assert_eq!(uri, "data:audio/wav;base64,UklGRg==");
        let (mime, bytes) = decode_data_uri(&uri)?;
        assert_eq!(mime, "audio/wav");
        assert_eq!(bytes, b"RIFF");
        assert!(decode_data_uri("https://example.com/a.png").is_err());
        Ok(())
    }
}
