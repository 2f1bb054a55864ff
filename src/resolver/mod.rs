use regex::Regex;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::common::errors::HubError;

pub mod models;
use models::{CombinationMode, MediaFormat, PlayerResponse};

// 上游播放器元数据接口
const PLAYER_ENDPOINT: &str = "https://www.youtube.com/youtubei/v1/player";
const CLIENT_NAME: &str = "WEB";
const CLIENT_VERSION: &str = "2.20240726.00.00";

/// 远程视频格式解析器：提取可选编码集合并按质量排序
pub struct FormatResolver {
    client: reqwest::Client,
}

impl FormatResolver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// 解析一个视频资源的全部可选编码
    ///
    /// 错误区分很重要：ResourceUnavailable 是永久性的（私有/下架/
    /// 区域封锁），ExtractionFailed 可能是暂时性的上游解析问题。
    pub async fn resolve(&self, resource_url: &str) -> Result<Vec<MediaFormat>, HubError> {
        let video_id = parse_video_id(resource_url)?;
        debug!("开始解析远程视频: {}", video_id);

        let body = json!({
            "videoId": video_id,
            "context": {
                "client": { "clientName": CLIENT_NAME, "clientVersion": CLIENT_VERSION }
            }
        });

        let response = self
            .client
            .post(PLAYER_ENDPOINT)
            .json(&body)
            .send()
            .await
            .map_err(|e| HubError::ExtractionFailed(format!("上游请求失败: {}", e)))?;

        let player: PlayerResponse = response
            .json()
            .await
            .map_err(|e| HubError::ExtractionFailed(format!("上游响应解析失败: {}", e)))?;

        if let Some(playability) = &player.playability_status {
            match playability.status.as_str() {
                "OK" => {}
                // 私有、下架、区域封锁：永久不可用，调用方不应重试
                "LOGIN_REQUIRED" | "UNPLAYABLE" | "AGE_CHECK_REQUIRED" => {
                    let reason = playability.reason.clone().unwrap_or_default();
                    warn!("资源不可用: {}, 原因: {}", video_id, reason);
                    return Err(HubError::ResourceUnavailable(reason));
                }
                other => {
                    return Err(HubError::ExtractionFailed(format!(
                        "上游状态异常: {}",
                        other
                    )));
                }
            }
        }

        let streaming = player
            .streaming_data
            .ok_or_else(|| HubError::ExtractionFailed("响应缺少流数据".to_string()))?;

        let mut formats: Vec<MediaFormat> = Vec::new();
        for raw in streaming.formats {
            formats.push(raw.into_media_format(true));
        }
        for raw in streaming.adaptive_formats {
            formats.push(raw.into_media_format(false));
        }

        if formats.is_empty() {
            return Err(HubError::ExtractionFailed("未解析出任何编码".to_string()));
        }
        debug!("解析到 {} 个编码: {}", formats.len(), video_id);
        Ok(formats)
    }
}

impl Default for FormatResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// 从资源 URL 提取视频 id
///
/// 合集/播放列表地址直接快速失败，绝不悄悄解析第一项。
pub fn parse_video_id(resource_url: &str) -> Result<String, HubError> {
    let url = Url::parse(resource_url.trim())
        .map_err(|_| HubError::InvalidResource(format!("无法解析的地址: {}", resource_url)))?;

    let host = url.host_str().unwrap_or("");
    if !matches!(
        host,
        "www.youtube.com" | "youtube.com" | "m.youtube.com" | "youtu.be"
    ) {
        return Err(HubError::InvalidResource(format!(
            "不是受支持的视频站点: {}",
            host
        )));
    }

    // 合集判定优先于单视频：/playlist 路径或 list 参数
    if url.path() == "/playlist" || url.query_pairs().any(|(k, _)| k == "list") {
        return Err(HubError::UnsupportedCollection(resource_url.to_string()));
    }

    let id_pattern = Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("内置正则必然合法");

    let candidate = if host == "youtu.be" {
        url.path().trim_start_matches('/').to_string()
    } else if let Some(rest) = url.path().strip_prefix("/shorts/") {
        rest.trim_end_matches('/').to_string()
    } else if url.path() == "/watch" {
        url.query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default()
    } else {
        String::new()
    };

    if id_pattern.is_match(&candidate) {
        Ok(candidate)
    } else {
        Err(HubError::InvalidResource(format!(
            "地址里没有合法的视频 id: {}",
            resource_url
        )))
    }
}

// --------------------------------------------------------------------
// 排序与选择都是解析结果上的纯函数，无任何网络副作用

/// 视频类格式：分辨率降序，同分辨率按帧率降序
pub fn rank_video(formats: &[MediaFormat]) -> Vec<MediaFormat> {
    let mut video: Vec<MediaFormat> = formats
        .iter()
        .filter(|f| f.has_video_component)
        .cloned()
        .collect();
    video.sort_by(|a, b| {
        b.quality_numeric()
            .cmp(&a.quality_numeric())
            .then(b.frame_rate.unwrap_or(0).cmp(&a.frame_rate.unwrap_or(0)))
    });
    video
}

/// 纯音频格式：码率降序
pub fn rank_audio(formats: &[MediaFormat]) -> Vec<MediaFormat> {
    let mut audio: Vec<MediaFormat> = formats
        .iter()
        .filter(|f| !f.has_video_component && f.has_audio_component)
        .cloned()
        .collect();
    audio.sort_by(|a, b| {
        b.audio_bitrate_kbps
            .unwrap_or(0)
            .cmp(&a.audio_bitrate_kbps.unwrap_or(0))
    });
    audio
}

/// 在指定组合方式里找同质量的替代编码
///
/// 调用方明确要了 video-only 时，先尝试同质量标签的 video-only 流，
/// 找不到才退回原选择，避免悄悄塞给它不想要的合流。
pub fn select_for_mode<'a>(
    formats: &'a [MediaFormat],
    mode: CombinationMode,
    quality_label: &str,
    current: &'a MediaFormat,
) -> &'a MediaFormat {
    formats
        .iter()
        .find(|f| f.matches_mode(mode) && f.quality_label == quality_label)
        .or_else(|| formats.iter().find(|f| f.matches_mode(mode)))
        .unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(id: &str, quality: &str, fps: Option<u32>, video: bool, audio: bool) -> MediaFormat {
        MediaFormat {
            format_id: id.to_string(),
            container_type: "mp4".to_string(),
            has_video_component: video,
            has_audio_component: audio,
            quality_label: quality.to_string(),
            frame_rate: fps,
            audio_bitrate_kbps: if audio && !video { Some(128) } else { None },
            mime_type: "video/mp4".to_string(),
        }
    }

    #[test]
    fn test_video_ranking_by_resolution() {
        // 480p/1080p/720p 输入，期望 1080p/720p/480p 输出
        let formats = vec![
            fmt("1", "480p", Some(30), true, false),
            fmt("2", "1080p", Some(30), true, false),
            fmt("3", "720p", Some(30), true, false),
        ];
        let ranked = rank_video(&formats);
        let labels: Vec<&str> = ranked.iter().map(|f| f.quality_label.as_str()).collect();
        assert_eq!(labels, vec!["1080p", "720p", "480p"]);
    }

    #[test]
    fn test_video_ranking_framerate_tiebreak() {
        let formats = vec![
            fmt("1", "1080p", Some(30), true, false),
            fmt("2", "1080p60", Some(60), true, false),
        ];
        let ranked = rank_video(&formats);
        assert_eq!(ranked[0].format_id, "2");
    }

    #[test]
    fn test_audio_ranking_by_bitrate() {
        let mut low = fmt("1", "64kbps", None, false, true);
        low.audio_bitrate_kbps = Some(64);
        let mut high = fmt("2", "160kbps", None, false, true);
        high.audio_bitrate_kbps = Some(160);
        let ranked = rank_audio(&[low, high]);
        assert_eq!(ranked[0].format_id, "2");
    }

    #[test]
    fn test_select_prefers_same_quality_in_mode() {
        let combined = fmt("1", "720p", Some(30), true, true);
        let video_only = fmt("2", "720p", Some(30), true, false);
        let formats = vec![combined.clone(), video_only];
        let chosen = select_for_mode(&formats, CombinationMode::VideoOnly, "720p", &combined);
        assert_eq!(chosen.format_id, "2");
    }

    #[test]
    fn test_select_falls_back_to_current() {
        let combined = fmt("1", "720p", Some(30), true, true);
        let formats = vec![combined.clone()];
        let chosen = select_for_mode(&formats, CombinationMode::AudioOnly, "720p", &combined);
        assert_eq!(chosen.format_id, "1");
    }

    #[test]
    fn test_watch_url_parsing() {
        assert_eq!(
            parse_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").expect("应能解析"),
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            parse_video_id("https://youtu.be/dQw4w9WgXcQ").expect("应能解析"),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_playlist_url_fails_fast() {
        let err = parse_video_id("https://www.youtube.com/playlist?list=PL123").unwrap_err();
        assert!(matches!(err, HubError::UnsupportedCollection(_)));
        // watch 页带 list 参数同样算合集
        let err =
            parse_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PL123").unwrap_err();
        assert!(matches!(err, HubError::UnsupportedCollection(_)));
    }

    #[test]
    fn test_foreign_url_is_invalid_resource() {
        let err = parse_video_id("https://example.com/watch?v=dQw4w9WgXcQ").unwrap_err();
        assert!(matches!(err, HubError::InvalidResource(_)));
    }
}
