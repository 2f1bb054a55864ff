use serde::{Deserialize, Serialize};

/// 远程视频的一种可选编码
///
/// 解析完成后不可变，归属于单次解析结果，不跨请求缓存。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub format_id: String,
    pub container_type: String,
    pub has_video_component: bool,
    pub has_audio_component: bool,
    pub quality_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_bitrate_kbps: Option<u32>,
    pub mime_type: String,
}

impl MediaFormat {
    /// 质量标签的数值分辨率，如 "1080p60" -> 1080；解析不出来按 0
    pub fn quality_numeric(&self) -> u32 {
        let digits: String = self
            .quality_label
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().unwrap_or(0)
    }

    pub fn matches_mode(&self, mode: CombinationMode) -> bool {
        match mode {
            CombinationMode::Combined => self.has_video_component && self.has_audio_component,
            CombinationMode::VideoOnly => self.has_video_component && !self.has_audio_component,
            CombinationMode::AudioOnly => !self.has_video_component && self.has_audio_component,
        }
    }
}

/// 媒体组件组合方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CombinationMode {
    Combined,
    VideoOnly,
    AudioOnly,
}

// --------------------------------------------------------------------
// 上游播放器元数据接口的原始响应形状

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    pub playability_status: Option<PlayabilityStatus>,
    pub streaming_data: Option<StreamingData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayabilityStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingData {
    /// 音画合流（有损画质上限，但开箱即用）
    #[serde(default)]
    pub formats: Vec<RawFormat>,
    /// 音画分离的自适应流
    #[serde(default)]
    pub adaptive_formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFormat {
    pub itag: i64,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub quality_label: Option<String>,
    #[serde(default)]
    pub fps: Option<u32>,
    #[serde(default)]
    pub bitrate: Option<u64>,
    #[serde(default)]
    pub audio_quality: Option<String>,
}

impl RawFormat {
    /// 原始形状 -> MediaFormat；combined 标记该条目是否来自合流列表
    pub fn into_media_format(self, combined: bool) -> MediaFormat {
        let has_video = self.mime_type.starts_with("video/");
        // 合流一定带音轨；自适应流里只有 audio/ 条目带音轨
        let has_audio = combined || self.mime_type.starts_with("audio/");

        let container = self
            .mime_type
            .split(';')
            .next()
            .and_then(|m| m.split('/').nth(1))
            .unwrap_or("unknown")
            .to_string();

        let audio_bitrate_kbps = if has_audio && !has_video {
            self.bitrate.map(|b| (b / 1000) as u32)
        } else {
            None
        };

        let quality_label = self.quality_label.clone().unwrap_or_else(|| {
            // 纯音频没有分辨率标签，用码率档位占位
            match audio_bitrate_kbps {
                Some(kbps) => format!("{}kbps", kbps),
                None => "unknown".to_string(),
            }
        });

        MediaFormat {
            format_id: self.itag.to_string(),
            container_type: container,
            has_video_component: has_video,
            has_audio_component: has_audio,
            quality_label,
            frame_rate: self.fps,
            audio_bitrate_kbps,
            mime_type: self.mime_type,
        }
    }
}
