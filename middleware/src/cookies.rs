use cookie::time::Duration;
use cookie::{Cookie, SameSite as CookieSameSite};
use http::header::{self, HeaderMap, HeaderValue};
use sessionkit_core::{CookieOptions, SameSite};
use tracing::warn;

/// Find the session id the client sent in its `Cookie` headers
pub fn session_id(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|id| !id.is_empty())
}

/// Cookie carrying the session id. A lifetime of 0 makes it a browser-session cookie.
pub fn session_cookie(
    name: &str,
    id: &str,
    options: &CookieOptions,
    lifetime: u64,
) -> Cookie<'static> {
    let mut cookie = base_cookie(name, id, options);
    if lifetime > 0 {
        let seconds = i64::try_from(lifetime).unwrap_or(i64::MAX);
        cookie.set_max_age(Duration::seconds(seconds));
    }
    cookie
}

/// Cookie telling the client to drop the session id
pub fn removal_cookie(name: &str, options: &CookieOptions) -> Cookie<'static> {
    let mut cookie = base_cookie(name, "", options);
    cookie.make_removal();
    cookie
}

fn base_cookie(name: &str, value: &str, options: &CookieOptions) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), value.to_string()))
        .path(options.path.clone())
        .secure(options.secure)
        .http_only(options.http_only)
        .same_site(same_site(options.same_site));
    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    builder.build()
}

fn same_site(value: SameSite) -> CookieSameSite {
    match value {
        SameSite::Strict => CookieSameSite::Strict,
        SameSite::Lax => CookieSameSite::Lax,
        SameSite::None => CookieSameSite::None,
    }
}

/// Append a `Set-Cookie` header
pub fn append_set_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => warn!(error = %e, cookie = %cookie.name(), "Invalid Set-Cookie header"),
    }
}
