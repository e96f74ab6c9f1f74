//! Hardware acceleration profiles and detection.
//!
//! Every profile except `none` requires an ffmpeg built with the matching
//! codec. Detection runs a tiny lavfi color-source encode through the
//! candidate encoder; the first candidate that succeeds wins. VideoToolbox
//! is detected via `-hwaccels` instead (the encode probe is unreliable in
//! sandboxed macOS environments).

use std::path::Path;

use tokio::process::Command;

use vf_core::HwAccel;

/// Everything the argv builder needs to know about one acceleration mode.
#[derive(Debug)]
pub struct HwProfile {
    pub accel: HwAccel,
    /// Arguments following `-hwaccel` on the input side; empty means no
    /// hardware decoding.
    pub decoder_args: &'static [&'static str],
    /// Arguments following `-c:v`.
    pub encoder_args: &'static [&'static str],
    /// Bitrate multiplier compensating for hardware encoders' lower
    /// quality-per-bit.
    pub encode_factor: f64,
    scale: fn(u32, u32) -> Vec<String>,
}

impl HwProfile {
    /// Video filter arguments scaling to `w`x`h` while preserving aspect.
    pub fn scale_args(&self, w: u32, h: u32) -> Vec<String> {
        (self.scale)(w, h)
    }

    /// The profile for one acceleration mode. `Auto` maps to the software
    /// profile; resolve it with [`detect`] first.
    pub fn for_accel(accel: HwAccel) -> &'static HwProfile {
        match accel {
            HwAccel::Nvenc => &NVENC,
            HwAccel::Qsv => &QSV,
            HwAccel::Vaapi => &VAAPI,
            HwAccel::VaapiLp => &VAAPI_LP,
            HwAccel::Vtb => &VTB,
            HwAccel::Amf => &AMF,
            HwAccel::None | HwAccel::Auto => &NONE,
        }
    }
}

fn scale_sw(w: u32, h: u32) -> Vec<String> {
    vec![
        "-vf".to_string(),
        format!("format=nv12,scale=force_original_aspect_ratio=decrease:w={w}:h={h}"),
    ]
}

fn scale_vaapi(w: u32, h: u32) -> Vec<String> {
    vec![
        "-vf".to_string(),
        format!(
            "format=nv12|vaapi,hwupload,scale_vaapi=force_original_aspect_ratio=decrease:format=nv12:w={w}:h={h}"
        ),
    ]
}

fn scale_cuda(w: u32, h: u32) -> Vec<String> {
    vec![
        "-vf".to_string(),
        format!(
            "format=nv12|cuda,hwupload,scale_cuda=force_original_aspect_ratio=decrease:passthrough=0:w={w}:h={h}"
        ),
    ]
}

static NONE: HwProfile = HwProfile {
    accel: HwAccel::None,
    decoder_args: &[],
    encoder_args: &["libx264", "-preset", "fast", "-crf", "23"],
    encode_factor: 1.0,
    scale: scale_sw,
};

static NVENC: HwProfile = HwProfile {
    accel: HwAccel::Nvenc,
    decoder_args: &["cuda"],
    encoder_args: &[
        "h264_nvenc",
        "-preset",
        "p6",
        "-tune",
        "ll",
        "-rc",
        "vbr",
        "-rc-lookahead",
        "30",
        "-cq",
        "23",
        "-temporal-aq",
        "1",
    ],
    encode_factor: 2.0,
    scale: scale_cuda,
};

static QSV: HwProfile = HwProfile {
    accel: HwAccel::Qsv,
    decoder_args: &["qsv"],
    encoder_args: &["h264_qsv"],
    encode_factor: 2.0,
    scale: scale_sw,
};

static VAAPI: HwProfile = HwProfile {
    accel: HwAccel::Vaapi,
    decoder_args: &[
        "vaapi",
        "-hwaccel_device",
        "/dev/dri/renderD128",
        "-hwaccel_output_format",
        "vaapi",
    ],
    encoder_args: &["h264_vaapi", "-global_quality", "21"],
    encode_factor: 2.0,
    scale: scale_vaapi,
};

static VAAPI_LP: HwProfile = HwProfile {
    accel: HwAccel::VaapiLp,
    decoder_args: &[
        "vaapi",
        "-hwaccel_device",
        "/dev/dri/renderD128",
        "-hwaccel_output_format",
        "vaapi",
    ],
    encoder_args: &["h264_vaapi", "-low_power", "1"],
    encode_factor: 2.0,
    scale: scale_vaapi,
};

static VTB: HwProfile = HwProfile {
    accel: HwAccel::Vtb,
    decoder_args: &["videotoolbox"],
    encoder_args: &["h264_videotoolbox", "-q:v", "50"],
    encode_factor: 2.0,
    scale: scale_sw,
};

static AMF: HwProfile = HwProfile {
    accel: HwAccel::Amf,
    decoder_args: &[],
    encoder_args: &["h264_amf"],
    encode_factor: 2.0,
    scale: scale_sw,
};

/// Resolve the effective acceleration mode.
///
/// `Auto` probes a per-OS candidate list and falls back to software; an
/// explicit mode is verified and also falls back to software when the probe
/// fails.
pub async fn detect(ffmpeg: &Path, requested: HwAccel) -> HwAccel {
    match requested {
        HwAccel::None => HwAccel::None,
        HwAccel::Auto => {
            let candidates: &[HwAccel] = match std::env::consts::OS {
                "linux" => &[HwAccel::Qsv, HwAccel::Vaapi, HwAccel::Nvenc, HwAccel::Amf],
                "macos" => &[HwAccel::Vtb],
                "windows" => &[HwAccel::Qsv, HwAccel::Nvenc, HwAccel::Amf],
                _ => &[],
            };
            for &candidate in candidates {
                if available(ffmpeg, candidate).await {
                    return candidate;
                }
            }
            HwAccel::None
        }
        explicit => {
            if available(ffmpeg, explicit).await {
                explicit
            } else {
                tracing::warn!(
                    requested = %explicit,
                    "requested hardware acceleration unavailable; using software encoding"
                );
                HwAccel::None
            }
        }
    }
}

async fn available(ffmpeg: &Path, accel: HwAccel) -> bool {
    match accel {
        HwAccel::None => true,
        HwAccel::Auto => false,
        HwAccel::Vtb => {
            if std::env::consts::OS != "macos" {
                return false;
            }
            let Ok(output) = Command::new(ffmpeg)
                .args(["-hide_banner", "-hwaccels"])
                .output()
                .await
            else {
                return false;
            };
            String::from_utf8_lossy(&output.stdout).contains("videotoolbox")
        }
        other => {
            let encoder = HwProfile::for_accel(other).encoder_args[0];
            encode_smoke_test(ffmpeg, encoder).await
        }
    }
}

/// Encode one second of black through `encoder`; success means the encoder
/// is usable on this machine.
async fn encode_smoke_test(ffmpeg: &Path, encoder: &str) -> bool {
    let mut cmd = Command::new(ffmpeg);
    cmd.args([
        "-hide_banner",
        "-f",
        "lavfi",
        "-i",
        "color=c=black:s=1280x720:d=1",
        "-c:v",
        encoder,
        "-f",
        "null",
        "-",
    ]);

    match cmd.output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_profile_is_default() {
        let profile = HwProfile::for_accel(HwAccel::None);
        assert_eq!(profile.encoder_args[0], "libx264");
        assert_eq!(profile.encode_factor, 1.0);
        assert!(profile.decoder_args.is_empty());
    }

    #[test]
    fn auto_maps_to_software_profile() {
        assert_eq!(HwProfile::for_accel(HwAccel::Auto).accel, HwAccel::None);
    }

    #[test]
    fn hardware_profiles_double_bitrate() {
        for accel in [
            HwAccel::Nvenc,
            HwAccel::Qsv,
            HwAccel::Vaapi,
            HwAccel::VaapiLp,
            HwAccel::Vtb,
            HwAccel::Amf,
        ] {
            assert_eq!(HwProfile::for_accel(accel).encode_factor, 2.0);
        }
    }

    #[test]
    fn scale_args_embed_dimensions() {
        let sw = HwProfile::for_accel(HwAccel::None).scale_args(1280, 720);
        assert_eq!(sw[0], "-vf");
        assert!(sw[1].contains("w=1280:h=720"));

        let vaapi = HwProfile::for_accel(HwAccel::Vaapi).scale_args(960, 540);
        assert!(vaapi[1].contains("scale_vaapi"));
        assert!(vaapi[1].contains("w=960:h=540"));

        let cuda = HwProfile::for_accel(HwAccel::Nvenc).scale_args(640, 360);
        assert!(cuda[1].contains("scale_cuda"));
    }

    #[tokio::test]
    async fn detect_none_short_circuits() {
        // Never touches the binary, so a bogus path is fine.
        let accel = detect(Path::new("/nonexistent/ffmpeg"), HwAccel::None).await;
        assert_eq!(accel, HwAccel::None);
    }

    #[tokio::test]
    async fn detect_explicit_falls_back_when_unavailable() {
        let accel = detect(Path::new("/nonexistent/ffmpeg"), HwAccel::Nvenc).await;
        assert_eq!(accel, HwAccel::None);
    }
}
