//! Media fixtures generated in memory so the tests carry no binary files.

#![allow(dead_code)]

use std::io::Cursor;

/// A short 16-bit mono PCM WAV file (silence).
pub fn wav_bytes() -> Vec<u8> {
    let sample_rate: u32 = 8_000;
    let samples: u32 = 800;
    let data_len = samples * 2;

    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.resize(44 + data_len as usize, 0);
    wav
}

/// A small PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_fn(8, 8, |x, y| image::Rgb([x as u8 * 30, y as u8 * 30, 128]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// Bytes that claim to be an MP4 container. Only the fake extractor reads them.
pub fn mp4_bytes() -> Vec<u8> {
    let mut mp4 = vec![0, 0, 0, 24];
    mp4.extend_from_slice(b"ftypisom");
    mp4.extend_from_slice(&[0u8; 64]);
    mp4
}

/// A model response in the format the generator is asked for.
pub const GENERATED_RESPONSE: &str = "CAPTION:\nWait for it... this changes how you cook pasta 🍝\n\n\
DESCRIPTION:\nA quick kitchen walkthrough.\n\nWe cover salting the water and timing.\n\n\
HASHTAGS:\n#pasta #cooking #kitchenhacks #foodie #recipe #italianfood";
