//! Session cookies set by the auth routes.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

pub const SESSION_COOKIE: &str = "session_token";
pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";
pub const REFRESH_TOKEN_COOKIE: &str = "sb-refresh-token";

const SESSION_MAX_AGE_DAYS: i64 = 7;
const REFRESH_MAX_AGE_DAYS: i64 = 7;

fn base_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// `session_token`: opaque local session, 7 days.
pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(SESSION_COOKIE, token, secure);
    cookie.set_max_age(time::Duration::days(SESSION_MAX_AGE_DAYS));
    cookie
}

/// `sb-access-token`: lives as long as the provider says the token does.
pub fn access_token_cookie(token: String, expires_in: i64, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(ACCESS_TOKEN_COOKIE, token, secure);
    cookie.set_max_age(time::Duration::seconds(expires_in.max(0)));
    cookie
}

/// `sb-refresh-token`: 7 days.
pub fn refresh_token_cookie(token: String, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(REFRESH_TOKEN_COOKIE, token, secure);
    cookie.set_max_age(time::Duration::days(REFRESH_MAX_AGE_DAYS));
    cookie
}

/// Expire every auth cookie, whether or not the request carried it.
pub fn clear_auth_cookies(jar: CookieJar) -> CookieJar {
    [SESSION_COOKIE, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE]
        .into_iter()
        .fold(jar, |jar, name| {
            let mut cookie = Cookie::build((name, "")).path("/").build();
            cookie.make_removal();
            jar.add(cookie)
        })
}

/// Read a cookie value, treating an empty value as absent.
pub fn non_empty_cookie(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc".to_string(), true);
        let rendered = cookie.to_string();

        assert_eq!(cookie.name(), "session_token");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert!(rendered.contains("Max-Age=604800"));
    }

    #[test]
    fn test_access_cookie_uses_expires_in() {
        let cookie = access_token_cookie("jwt".to_string(), 3600, false);

        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(3600)));
        assert_eq!(cookie.secure(), Some(false));
    }

    #[test]
    fn test_clear_auth_cookies_emits_removals() {
        let jar = CookieJar::new()
            .add(session_cookie("abc".to_string(), false))
            .add(refresh_token_cookie("r".to_string(), false));

        let jar = clear_auth_cookies(jar);

        for name in [SESSION_COOKIE, REFRESH_TOKEN_COOKIE, ACCESS_TOKEN_COOKIE] {
            let cookie = jar.get(name).unwrap();
            assert_eq!(cookie.value(), "");
            assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
            assert_eq!(non_empty_cookie(&jar, name), None);
        }
    }

    #[test]
    fn test_empty_cookie_is_absent() {
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, ""));
        assert_eq!(non_empty_cookie(&jar, SESSION_COOKIE), None);
    }
}
