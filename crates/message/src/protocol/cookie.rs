//! Response cookies.
//!
//! A [`Cookie`] is identified by name, domain and path (its [`Cookie::key`] is
//! `domain@path:name`), so same-named cookies can coexist across scopes but
//! not within one. [`CookieJar`] keeps them in insertion order and replaces a
//! cookie in place when a cookie with the same key is stored again.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::trace;

/// Expiry of a cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Expires {
    /// No `expires` attribute, the cookie lives for the browser session.
    #[default]
    Session,
    At(SystemTime),
    /// A date string that is neither an HTTP date nor a relative offset, emitted verbatim.
    Raw(String),
}

impl Expires {
    /// Seconds since the Unix epoch; 0 means a session cookie.
    pub fn from_timestamp(secs: u64) -> Self {
        if secs == 0 { Expires::Session } else { Expires::At(UNIX_EPOCH + Duration::from_secs(secs)) }
    }

    /// Reads an `expires` value: a timestamp, an HTTP date, or an offset from
    /// now such as `+1 day` or `-30 min`.
    pub fn parse(value: &str) -> Self {
        Self::parse_at(value, SystemTime::now())
    }

    /// Like [`Expires::parse`], resolving relative offsets against `now`.
    pub fn parse_at(value: &str, now: SystemTime) -> Self {
        let value = value.trim();
        if value.is_empty() {
            return Expires::Session;
        }
        if let Ok(secs) = value.parse::<u64>() {
            return Self::from_timestamp(secs);
        }
        if let Ok(time) = httpdate::parse_http_date(value) {
            return Expires::At(time);
        }

        let resolved = relative_seconds(value).and_then(|secs| {
            let offset = Duration::from_secs(secs.unsigned_abs());
            if secs >= 0 { now.checked_add(offset) } else { now.checked_sub(offset) }
        });
        match resolved {
            Some(time) => Expires::At(time),
            None => {
                trace!(value, "keep unrecognized cookie expiry verbatim");
                Expires::Raw(value.to_string())
            }
        }
    }

    fn to_attribute(&self) -> Option<String> {
        match self {
            Expires::Session => None,
            Expires::At(time) => Some(httpdate::fmt_http_date(*time)),
            Expires::Raw(raw) => Some(raw.clone()),
        }
    }
}

/// Sums `now`, or `<amount> <unit>` terms with units from seconds to weeks.
fn relative_seconds(value: &str) -> Option<i64> {
    if value.eq_ignore_ascii_case("now") {
        return Some(0);
    }

    let mut tokens = value.split_whitespace();
    let mut total: i64 = 0;
    let mut terms = 0;
    while let Some(amount) = tokens.next() {
        let amount = amount.parse::<i64>().ok()?;
        let unit = tokens.next()?.to_ascii_lowercase();
        let scale = match unit.strip_suffix('s').unwrap_or(&unit) {
            "sec" | "second" => 1,
            "min" | "minute" => 60,
            "hour" => 3_600,
            "day" => 86_400,
            "week" => 604_800,
            _ => return None,
        };
        total = total.checked_add(amount.checked_mul(scale)?)?;
        terms += 1;
    }
    (terms > 0).then_some(total)
}

/// A cookie set by a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    path: String,
    domain: String,
    expires: Expires,
    host_only: bool,
    secure: bool,
    http_only: bool,
}

impl Cookie {
    /// A cookie for path `/`, no domain, no expiry and no flags.
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_string(),
            domain: String::new(),
            expires: Expires::Session,
            host_only: false,
            secure: false,
            http_only: false,
        }
    }

    pub fn with_path<S: Into<String>>(mut self, path: S) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_domain<S: Into<String>>(mut self, domain: S) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_expires(mut self, expires: Expires) -> Self {
        self.expires = expires;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_host_only(mut self, host_only: bool) -> Self {
        self.host_only = host_only;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn expires(&self) -> &Expires {
        &self.expires
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_host_only(&self) -> bool {
        self.host_only
    }

    pub fn is_http_only(&self) -> bool {
        self.http_only
    }

    /// `domain@path:name`, the identity of the cookie inside a [`CookieJar`].
    pub fn key(&self) -> String {
        cookie_key(&self.name, &self.domain, &self.path)
    }

    /// Reads a `Set-Cookie` header value.
    ///
    /// The first `;`-separated token is the `name=value` pair; the following
    /// tokens are `key=value` attributes or bare flags. Unknown attributes are
    /// ignored. Returns `None` when the pair has no name.
    pub fn parse(header: &str) -> Option<Self> {
        let mut tokens = header.split(';');
        let (name, value) = decode_pair(tokens.next()?.trim())?;
        let mut cookie = Cookie::new(name, value);

        for token in tokens.map(str::trim).filter(|t| !t.is_empty()) {
            let (key, value) = token.split_once('=').map_or((token, None), |(k, v)| (k.trim(), Some(v.trim())));
            match (key.to_ascii_lowercase().as_str(), value) {
                ("path", Some(path)) => cookie.path = path.to_string(),
                ("domain", Some(domain)) => cookie.domain = domain.to_string(),
                ("expires", Some(expires)) => cookie.expires = Expires::parse(expires),
                ("secure", None) => cookie.secure = true,
                ("hostonly", None) => cookie.host_only = true,
                ("httponly", None) => cookie.http_only = true,
                (other, _) => trace!(attribute = other, "ignore unknown cookie attribute"),
            }
        }
        Some(cookie)
    }

    /// Renders the cookie as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let pair = serde_urlencoded::to_string(vec![(self.name.as_str(), self.value.as_str())])
            .unwrap_or_else(|_| format!("{}={}", self.name, self.value));
        let mut attributes = vec![pair, format!("path={}", self.path)];
        if !self.domain.is_empty() {
            attributes.push(format!("domain={}", self.domain));
        }
        if let Some(expires) = self.expires.to_attribute() {
            attributes.push(format!("expires={expires}"));
        }
        if self.secure {
            attributes.push("secure".to_string());
        }
        if self.host_only {
            attributes.push("hostonly".to_string());
        }
        if self.http_only {
            attributes.push("httponly".to_string());
        }
        attributes.join("; ")
    }
}

/// Cookies of a response, unique per `domain@path:name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `cookie`, replacing a cookie with the same key.
    pub fn insert(&mut self, cookie: Cookie) {
        let key = cookie.key();
        match self.cookies.iter_mut().find(|c| c.key() == key) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    pub fn get(&self, name: &str, domain: &str, path: &str) -> Option<&Cookie> {
        let key = cookie_key(name, domain, path);
        self.cookies.iter().find(|c| c.key() == key)
    }

    pub fn remove(&mut self, name: &str, domain: &str, path: &str) -> Option<Cookie> {
        let key = cookie_key(name, domain, path);
        let index = self.cookies.iter().position(|c| c.key() == key)?;
        Some(self.cookies.remove(index))
    }

    pub fn keys(&self) -> Vec<String> {
        self.cookies.iter().map(Cookie::key).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cookie> {
        self.cookies.iter()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

impl<'a> IntoIterator for &'a CookieJar {
    type Item = &'a Cookie;
    type IntoIter = std::slice::Iter<'a, Cookie>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn cookie_key(name: &str, domain: &str, path: &str) -> String {
    format!("{domain}@{path}:{name}")
}

fn decode_pair(pair: &str) -> Option<(String, String)> {
    let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let decoded = serde_urlencoded::from_str::<Vec<(String, String)>>(&format!("{name}={}", value.trim()))
        .ok()
        .and_then(|pairs| pairs.into_iter().next());
    Some(decoded.unwrap_or_else(|| (name.to_string(), value.trim().to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_header_value() {
        assert_eq!(Cookie::new("foo", "bar").to_header_value(), "foo=bar; path=/");
    }

    #[test]
    fn test_full_header_value() {
        let cookie = Cookie::new("session", "a b")
            .with_path("/app")
            .with_domain("example.com")
            .with_expires(Expires::from_timestamp(1_482_515_155))
            .with_secure(true)
            .with_http_only(true);

        assert_eq!(
            cookie.to_header_value(),
            "session=a+b; path=/app; domain=example.com; expires=Fri, 23 Dec 2016 17:45:55 GMT; secure; httponly"
        );
    }

    #[test]
    fn test_parse_set_cookie() {
        let cookie =
            Cookie::parse("foo=bar; path=/test; domain=www.foobar.com; expires=Fri, 23 Dec 2016 17:45:55 GMT; HttpOnly; secure")
                .unwrap();

        assert_eq!(cookie.name(), "foo");
        assert_eq!(cookie.value(), "bar");
        assert_eq!(cookie.path(), "/test");
        assert_eq!(cookie.domain(), "www.foobar.com");
        assert_eq!(cookie.expires(), &Expires::from_timestamp(1_482_515_155));
        assert!(cookie.is_http_only());
        assert!(cookie.is_secure());
        assert!(!cookie.is_host_only());
        assert_eq!(cookie.key(), "www.foobar.com@/test:foo");
    }

    #[test]
    fn test_parse_round_trip() {
        let cookie = Cookie::new("name", "va=lue").with_host_only(true).with_expires(Expires::Raw("tomorrow".into()));
        assert_eq!(Cookie::parse(&cookie.to_header_value()), Some(cookie));
    }

    #[test]
    fn test_relative_expiry() {
        let now = UNIX_EPOCH + Duration::from_secs(1_482_515_155);

        assert_eq!(Expires::parse_at("+1 day", now), Expires::from_timestamp(1_482_601_555));
        assert_eq!(Expires::parse_at("-30 mins", now), Expires::from_timestamp(1_482_513_355));
        assert_eq!(Expires::parse_at("1 week 2 hours", now), Expires::from_timestamp(1_483_127_155));
        assert_eq!(Expires::parse_at("now", now), Expires::At(now));
        assert_eq!(Expires::parse_at("+1 fortnight", now), Expires::Raw("+1 fortnight".into()));

        let cookie = Cookie::parse("foo=bar; expires=+1 day").unwrap();
        assert!(matches!(cookie.expires(), Expires::At(_)));
        assert!(cookie.to_header_value().ends_with(" GMT"));
    }

    #[test]
    fn test_parse_without_name() {
        assert_eq!(Cookie::parse("=value; path=/"), None);
        assert_eq!(Cookie::parse("flag").map(|c| c.value().to_string()), Some(String::new()));
    }

    #[test]
    fn test_jar_scoping() {
        let mut jar = CookieJar::new();
        jar.insert(Cookie::new("foo", "1"));
        jar.insert(Cookie::new("foo", "2"));
        assert_eq!(jar.len(), 1);
        assert_eq!(jar.get("foo", "", "/").unwrap().value(), "2");

        jar.insert(Cookie::new("foo", "3").with_path("/demo"));
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.get("foo", "", "/demo").unwrap().value(), "3");
        assert_eq!(jar.get("foo", "", "/").unwrap().value(), "2");
        assert_eq!(jar.keys(), ["@/:foo", "@/demo:foo"]);

        assert!(jar.remove("foo", "", "/").is_some());
        assert_eq!(jar.len(), 1);
    }
}
