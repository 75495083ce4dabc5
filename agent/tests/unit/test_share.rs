//! Share-link handshake against a mock share service

use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;

use appcompat::errors::AgentError;
use appcompat::share::ShareLinkResolver;
use appcompat::utils::FixedClock;

const NOW_MILLIS: u64 = 1_700_000_123_456;

const SHARE_PAGE: &str = r#"<html><head><script>
    var aKey = 'a1B2c3D4';
    var installToken = "tok987";
    var timeSign = '5D3E9A0B7C1F';
    var authcode = "5";
</script></head><body>Shop</body></html>"#;

fn resolver(base_url: &str) -> ShareLinkResolver {
    ShareLinkResolver::new(base_url, Duration::from_secs(5), Arc::new(FixedClock(NOW_MILLIS)))
        .unwrap()
}

fn signed_query() -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("time".into(), NOW_MILLIS.to_string()),
        Matcher::UrlEncoded("finalCode".into(), "123461123456".into()),
        Matcher::UrlEncoded("timeSign".into(), "5d3e9a0b7c1f".into()),
        Matcher::UrlEncoded("installToken".into(), "tok987".into()),
    ])
}

#[tokio::test]
async fn test_apk_redirect_is_returned_verbatim() {
    let mut server = mockito::Server::new_async().await;
    let share_url = format!("{}/AbCd", server.url());

    let page = server
        .mock("GET", "/AbCd")
        .with_status(200)
        .with_header("set-cookie", "session=s3ss10n; Path=/")
        .with_body(SHARE_PAGE)
        .create_async()
        .await;
    let install = server
        .mock("GET", "/app/install/a1B2c3D4")
        .match_query(signed_query())
        .match_header("cookie", Matcher::Regex("session=s3ss10n".into()))
        .match_header("referer", share_url.as_str())
        .with_status(302)
        .with_header(
            "location",
            "https://cdn.example.com/builds/shop-2.0.apk?sign=ab%2Fcd",
        )
        .create_async()
        .await;

    let resolver = resolver(&server.url());
    assert!(resolver.is_share_link(&share_url));

    let url = resolver.resolve(&share_url).await.unwrap();
    assert_eq!(url, "https://cdn.example.com/builds/shop-2.0.apk?sign=ab%2Fcd");

    page.assert_async().await;
    install.assert_async().await;
}

#[tokio::test]
async fn test_missing_akey_stops_before_install_request() {
    let mut server = mockito::Server::new_async().await;
    let share_url = format!("{}/Expired", server.url());

    server
        .mock("GET", "/Expired")
        .with_status(200)
        .with_body("<html><body>This link has expired</body></html>")
        .create_async()
        .await;
    let install = server
        .mock("GET", Matcher::Regex("^/app/install/".into()))
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let err = resolver(&server.url()).resolve(&share_url).await.unwrap_err();
    match err {
        AgentError::ResolutionError(message) => {
            assert_eq!(message, "Could not find aKey. Page might be invalid or expired.")
        }
        other => panic!("unexpected error: {other}"),
    }
    install.assert_async().await;
}

#[tokio::test]
async fn test_itms_redirect_reads_install_manifest() {
    let mut server = mockito::Server::new_async().await;
    let share_url = format!("{}/IosBuild", server.url());

    server
        .mock("GET", "/IosBuild")
        .with_status(200)
        .with_header("set-cookie", "session=s3ss10n; Path=/")
        .with_body(SHARE_PAGE)
        .create_async()
        .await;
    let itms = format!(
        "itms-services://?action=download-manifest&url={}/app/install//s.plist",
        server.url()
    );
    let install = server
        .mock("GET", "/app/install/a1B2c3D4")
        .match_query(Matcher::Any)
        .match_header("cookie", Matcher::Regex("session=s3ss10n".into()))
        .with_status(302)
        .with_header("location", itms.as_str())
        .create_async()
        .await;
    let manifest = server
        .mock("GET", "/app/install/s.plist")
        .match_header("user-agent", "itunesstored/1.0")
        .match_header("cookie", Matcher::Missing)
        .with_status(200)
        .with_body(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0"><dict><key>items</key><array><dict>
<key>assets</key><array>
<dict><key>kind</key><string>software-package</string>
<key>url</key><string>https://cdn.example.com/builds/Shop.ipa</string></dict>
</array></dict></array></dict></plist>"#,
        )
        .create_async()
        .await;

    let url = resolver(&server.url()).resolve(&share_url).await.unwrap();
    assert_eq!(url, "https://cdn.example.com/builds/Shop.ipa");
    install.assert_async().await;
    manifest.assert_async().await;
}

#[tokio::test]
async fn test_json_download_url() {
    let mut server = mockito::Server::new_async().await;
    let share_url = format!("{}/Json", server.url());

    server
        .mock("GET", "/Json")
        .with_status(200)
        .with_body(SHARE_PAGE)
        .create_async()
        .await;
    server
        .mock("GET", "/app/install/a1B2c3D4")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"code": 0, "data": {"downloadURL": "https://cdn.example.com/builds/shop-3.apk"}}"#)
        .create_async()
        .await;

    let url = resolver(&server.url()).resolve(&share_url).await.unwrap();
    assert_eq!(url, "https://cdn.example.com/builds/shop-3.apk");
}

#[tokio::test]
async fn test_unresolvable_install_response() {
    let mut server = mockito::Server::new_async().await;
    let share_url = format!("{}/Odd", server.url());

    server
        .mock("GET", "/Odd")
        .with_status(200)
        .with_body(SHARE_PAGE)
        .create_async()
        .await;
    server
        .mock("GET", "/app/install/a1B2c3D4")
        .match_query(Matcher::Any)
        .with_status(302)
        .with_header("location", "https://www.example.com/login")
        .create_async()
        .await;

    let err = resolver(&server.url()).resolve(&share_url).await.unwrap_err();
    assert!(matches!(err, AgentError::ResolutionError(ref m) if m.contains("Unrecognized redirect")));
}

#[tokio::test]
async fn test_json_without_url_is_resolution_error() {
    let mut server = mockito::Server::new_async().await;
    let share_url = format!("{}/NoUrl", server.url());

    server
        .mock("GET", "/NoUrl")
        .with_status(200)
        .with_body(SHARE_PAGE)
        .create_async()
        .await;
    server
        .mock("GET", "/app/install/a1B2c3D4")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"code": 1001, "message": "need password"}"#)
        .create_async()
        .await;

    let err = resolver(&server.url()).resolve(&share_url).await.unwrap_err();
    assert!(matches!(err, AgentError::ResolutionError(ref m) if m == "no download URL resolved"));
}
