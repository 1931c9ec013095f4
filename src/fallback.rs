//! Offline fallback document.
//!
//! Served in place of a browser error page when a navigation can be
//! answered by neither the network nor the current generation.

use crate::types::Response;

/// Content type of the offline document.
pub const OFFLINE_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// The offline notice, in Latvian (the site's primary language).
pub const OFFLINE_HTML: &str = r#"<!DOCTYPE html>
<html lang="lv">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Bezsaistē</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 32rem; margin: 4rem auto; padding: 0 1rem; line-height: 1.5; }
  h1 { font-size: 1.4rem; }
</style>
</head>
<body>
<h1>Jūs esat bezsaistē</h1>
<p>Šī lapa vēl nav saglabāta lietošanai bez interneta. Pārbaudiet savienojumu un mēģiniet vēlreiz.</p>
<p><a href="/">Atgriezties uz sākumlapu</a></p>
</body>
</html>
"#;

/// Build the offline document response.
///
/// Always status 200 so the browser renders it as a page.
pub fn offline_document() -> Response {
    Response::new(200, OFFLINE_HTML)
        .with_header("content-type", OFFLINE_CONTENT_TYPE)
        .with_header("cache-control", "no-store")
}
