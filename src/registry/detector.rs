use regex::Regex;

use crate::common::errors::HubError;

/// 描述符形状路由结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorKind {
    /// 内容标识符（磁力链或裸 infohash），路由到群后端
    Swarm { infohash: String },
    /// 其余合法 URL 一律交给下载守护进程
    Daemon,
}

/// 按描述符形状选择后端，语法不合法直接拒绝
pub fn detect(descriptor: &str) -> Result<DescriptorKind, HubError> {
    let descriptor = descriptor.trim();
    if descriptor.is_empty() {
        return Err(HubError::InvalidDescriptor("空描述符".to_string()));
    }

    if descriptor.starts_with("magnet:") {
        let infohash = extract_infohash(descriptor).ok_or_else(|| {
            HubError::InvalidDescriptor(format!("磁力链缺少合法的 btih: {}", descriptor))
        })?;
        return Ok(DescriptorKind::Swarm { infohash });
    }

    // 裸 infohash 也按群描述符处理
    let hex40 = Regex::new(r"^[0-9a-fA-F]{40}$").expect("内置正则必然合法");
    if hex40.is_match(descriptor) {
        return Ok(DescriptorKind::Swarm {
            infohash: descriptor.to_lowercase(),
        });
    }

    if descriptor.starts_with("http://") || descriptor.starts_with("https://") {
        if url::Url::parse(descriptor).is_err() {
            return Err(HubError::InvalidDescriptor(format!(
                "无法解析的 URL: {}",
                descriptor
            )));
        }
        return Ok(DescriptorKind::Daemon);
    }

    Err(HubError::InvalidDescriptor(format!(
        "无法识别的描述符: {}",
        descriptor
    )))
}

// 从磁力链提取 btih infohash（40 位十六进制或 32 位 base32）
fn extract_infohash(magnet: &str) -> Option<String> {
    let raw = magnet.split("btih:").nth(1)?.split('&').next()?;
    let hex40 = Regex::new(r"^[0-9a-fA-F]{40}$").expect("内置正则必然合法");
    let base32 = Regex::new(r"^[A-Za-z2-7]{32}$").expect("内置正则必然合法");
    if hex40.is_match(raw) || base32.is_match(raw) {
        Some(raw.to_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "aabbccddeeff00112233445566778899aabbccdd";

    #[test]
    fn test_magnet_routes_to_swarm() {
        let magnet = format!("magnet:?xt=urn:btih:{}&dn=movie", HASH);
        match detect(&magnet).expect("合法磁力链") {
            DescriptorKind::Swarm { infohash } => assert_eq!(infohash, HASH),
            other => panic!("期望路由到群后端: {:?}", other),
        }
    }

    #[test]
    fn test_bare_infohash_routes_to_swarm() {
        match detect(&HASH.to_uppercase()).expect("裸 infohash 合法") {
            DescriptorKind::Swarm { infohash } => assert_eq!(infohash, HASH),
            other => panic!("期望路由到群后端: {:?}", other),
        }
    }

    #[test]
    fn test_http_url_routes_to_daemon() {
        assert_eq!(
            detect("https://example.com/big.iso").expect("合法 URL"),
            DescriptorKind::Daemon
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            detect("ftp-ish nonsense"),
            Err(HubError::InvalidDescriptor(_))
        ));
        assert!(matches!(detect(""), Err(HubError::InvalidDescriptor(_))));
        // 磁力链但 btih 损坏
        assert!(matches!(
            detect("magnet:?xt=urn:btih:zzzz"),
            Err(HubError::InvalidDescriptor(_))
        ));
    }
}
