use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

struct WavInfo {
    fmt_content: Vec<u8>,
    byte_rate: u32,
    data_offset: u64,
    data_size: u32,
}

fn scan_wav<R: Read + Seek>(r: &mut R) -> Result<WavInfo> {
    let mut id = [0u8; 4];
    r.read_exact(&mut id)?;
    if &id != b"RIFF" {
        return Err(anyhow!("not a RIFF file"));
    }

    // Skip file size
    r.seek(SeekFrom::Current(4))?;

    r.read_exact(&mut id)?;
    if &id != b"WAVE" {
        return Err(anyhow!("not a WAVE file"));
    }

    let mut fmt_content: Option<Vec<u8>> = None;
    let mut data_offset: Option<u64> = None;
    let mut data_size: Option<u32> = None;

    loop {
        let mut chunk_id = [0u8; 4];
        let n = r.read(&mut chunk_id)?;
        if n == 0 {
            break; // EOF
        }
        if n < 4 {
            return Err(anyhow!("unexpected EOF reading chunk ID"));
        }

        let mut size_buf = [0u8; 4];
        r.read_exact(&mut size_buf)?;
        let chunk_size = u32::from_le_bytes(size_buf);

        if &chunk_id == b"fmt " {
            let mut buf = vec![0u8; chunk_size as usize];
            r.read_exact(&mut buf)?;
            fmt_content = Some(buf);
        } else if &chunk_id == b"data" {
            data_offset = Some(r.stream_position()?);
            data_size = Some(chunk_size);
            break;
        } else {
            r.seek(SeekFrom::Current(chunk_size as i64))?;
        }
    }

    let fmt_content = fmt_content.ok_or_else(|| anyhow!("missing fmt chunk"))?;
    if fmt_content.len() < 16 {
        return Err(anyhow!("fmt chunk too short: {} bytes", fmt_content.len()));
    }
    // fmt layout: format(2) channels(2) sample_rate(4) byte_rate(4) ...
    let byte_rate = u32::from_le_bytes([
        fmt_content[8],
        fmt_content[9],
        fmt_content[10],
        fmt_content[11],
    ]);

    Ok(WavInfo {
        fmt_content,
        byte_rate,
        data_offset: data_offset.ok_or_else(|| anyhow!("missing data chunk"))?,
        data_size: data_size.ok_or_else(|| anyhow!("missing data chunk size"))?,
    })
}

/// Measured duration of a synthesized WAV clip, derived from the data chunk
/// size and the declared byte rate. Caption timing is built on this value,
/// so it must reflect the actual audio, never a text-length estimate.
pub fn wav_duration_secs(bytes: &[u8]) -> Result<f64> {
    let info = scan_wav(&mut Cursor::new(bytes))?;
    if info.byte_rate == 0 {
        return Err(anyhow!("WAV declares zero byte rate"));
    }
    Ok(info.data_size as f64 / info.byte_rate as f64)
}

/// Merges multiple WAV files into one narration track by concatenating their
/// data chunks. All inputs must share the same fmt chunk (sample rate,
/// channels, bit depth).
pub fn merge_wav_files(input_paths: &[std::path::PathBuf], output_path: &Path) -> Result<()> {
    if input_paths.is_empty() {
        return Ok(());
    }

    let mut total_data_size: u32 = 0;
    let mut infos = Vec::with_capacity(input_paths.len());

    let mut first = File::open(&input_paths[0])?;
    let first_info = scan_wav(&mut first)?;
    let base_fmt = first_info.fmt_content.clone();

    total_data_size += first_info.data_size;
    infos.push(first_info);

    for path in &input_paths[1..] {
        let mut f = File::open(path)?;
        let info = scan_wav(&mut f).with_context(|| format!("failed to parse WAV {:?}", path))?;

        if info.fmt_content != base_fmt {
            return Err(anyhow!(
                "WAV format mismatch in {:?}; all segments must share sample rate and channels",
                path
            ));
        }

        total_data_size += info.data_size;
        infos.push(info);
    }

    let mut out = File::create(output_path)?;

    out.write_all(b"RIFF")?;
    let chunk_size = 4 + 8 + base_fmt.len() as u32 + 8 + total_data_size;
    out.write_all(&chunk_size.to_le_bytes())?;
    out.write_all(b"WAVE")?;

    out.write_all(b"fmt ")?;
    out.write_all(&(base_fmt.len() as u32).to_le_bytes())?;
    out.write_all(&base_fmt)?;

    out.write_all(b"data")?;
    out.write_all(&total_data_size.to_le_bytes())?;

    for (i, info) in infos.iter().enumerate() {
        let mut input = File::open(&input_paths[i])?;
        input.seek(SeekFrom::Start(info.data_offset))?;
        let mut reader = input.take(info.data_size as u64);
        std::io::copy(&mut reader, &mut out)?;
    }

    Ok(())
}

/// Builds a PCM WAV of the given duration at 24 kHz mono 16-bit. Used by
/// mock speech providers in tests.
#[cfg(test)]
pub(crate) fn test_wav(duration_secs: f64) -> Vec<u8> {
    let sample_rate: u32 = 24_000;
    let byte_rate = sample_rate * 2; // mono, 16-bit
    let data_size = (duration_secs * byte_rate as f64).round() as u32;

    let mut buf = Vec::new();
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_size).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes()); // block align
    buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    buf.extend_from_slice(&vec![0u8; data_size as usize]);

    buf
}
