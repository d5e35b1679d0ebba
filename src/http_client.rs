use std::net::IpAddr;
use std::time::Duration;

use reqwest::ClientBuilder;

fn has_proxy_env() -> bool {
    [
        "HTTPS_PROXY",
        "https_proxy",
        "HTTP_PROXY",
        "http_proxy",
        "ALL_PROXY",
        "all_proxy",
    ]
    .iter()
    .any(|k| std::env::var(k).is_ok_and(|v| !v.trim().is_empty()))
}

fn no_proxy_forced() -> bool {
    std::env::var("PAY_GATEWAY_NO_PROXY")
        .is_ok_and(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes" | "YES"))
}

fn should_bypass_proxy_impl(url: &str, proxy_env_present: bool, forced: bool) -> bool {
    if !proxy_env_present {
        return false;
    }
    if forced {
        return true;
    }

    let Ok(u) = reqwest::Url::parse(url) else {
        return false;
    };
    let Some(host) = u.host_str() else {
        return false;
    };
    // 本机地址（联调用的模拟网关）不走代理
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host == "localhost" || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

pub fn maybe_disable_proxy(builder: ClientBuilder, url: &str) -> ClientBuilder {
    if should_bypass_proxy_impl(url, has_proxy_env(), no_proxy_forced()) {
        builder.no_proxy()
    } else {
        builder
    }
}

/// 访问支付网关的客户端：必须带超时，超时按网关不可达处理
pub fn client_for_url_with_timeout(
    url: &str,
    timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    let builder = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout);
    maybe_disable_proxy(builder, url).build()
}

#[cfg(test)]
mod tests {
    use super::should_bypass_proxy_impl;

    #[test]
    fn bypass_proxy_for_loopback_when_proxy_env_present() {
        assert!(should_bypass_proxy_impl("http://127.0.0.1:9000/mapi.php", true, false));
        assert!(should_bypass_proxy_impl("http://localhost/mapi.php", true, false));
        assert!(should_bypass_proxy_impl("http://[::1]:8080/", true, false));
        assert!(!should_bypass_proxy_impl("https://pay.example.com/mapi.php", true, false));
    }

    #[test]
    fn forced_bypass_applies_to_any_host() {
        assert!(should_bypass_proxy_impl("https://pay.example.com/mapi.php", true, true));
    }

    #[test]
    fn do_not_bypass_without_proxy_env() {
        assert!(!should_bypass_proxy_impl("http://127.0.0.1:9000/", false, true));
    }
}
