use std::fmt;

/// A SIP header name, normalized through the short-form alias table
/// (spec §3/§4.1). `Extension` carries the canonicalized (but not
/// further-recognized) name for anything outside the known set -- we still
/// need to preserve and serialize headers we don't have typed support for
/// (`X-*`, `P-*`, `Diversion`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeaderName {
    Via,
    Route,
    RecordRoute,
    From,
    To,
    CallId,
    CSeq,
    Contact,
    MaxForwards,
    UserAgent,
    ContentType,
    ContentLength,
    ContentEncoding,
    Subject,
    Expires,
    Allow,
    Supported,
    Require,
    Unsupported,
    Event,
    SubscriptionState,
    ReferTo,
    ReferredBy,
    Replaces,
    WwwAuthenticate,
    ProxyAuthenticate,
    Authorization,
    ProxyAuthorization,
    Accept,
    AcceptEncoding,
    AcceptLanguage,
    MinExpires,
    Date,
    Extension(String),
}

impl HeaderName {
    /// Resolve a wire-form name (short alias or long form, any case) to a
    /// canonical [`HeaderName`]. Unknown names become `Extension` with the
    /// original casing preserved for serialization.
    pub fn resolve(raw: &str) -> HeaderName {
        let lower = raw.to_ascii_lowercase();
        match lower.as_str() {
            "via" | "v" => HeaderName::Via,
            "route" => HeaderName::Route,
            "record-route" => HeaderName::RecordRoute,
            "from" | "f" => HeaderName::From,
            "to" | "t" => HeaderName::To,
            "call-id" | "i" => HeaderName::CallId,
            "cseq" => HeaderName::CSeq,
            "contact" | "m" => HeaderName::Contact,
            "max-forwards" => HeaderName::MaxForwards,
            "user-agent" => HeaderName::UserAgent,
            "content-type" | "c" => HeaderName::ContentType,
            "content-length" | "l" => HeaderName::ContentLength,
            "content-encoding" | "e" => HeaderName::ContentEncoding,
            "subject" | "s" => HeaderName::Subject,
            "expires" => HeaderName::Expires,
            "allow" => HeaderName::Allow,
            "supported" | "k" => HeaderName::Supported,
            "require" => HeaderName::Require,
            "unsupported" => HeaderName::Unsupported,
            "event" | "o" => HeaderName::Event,
            "subscription-state" => HeaderName::SubscriptionState,
            "refer-to" | "r" => HeaderName::ReferTo,
            "referred-by" | "b" => HeaderName::ReferredBy,
            "replaces" => HeaderName::Replaces,
            "www-authenticate" => HeaderName::WwwAuthenticate,
            "proxy-authenticate" => HeaderName::ProxyAuthenticate,
            "authorization" => HeaderName::Authorization,
            "proxy-authorization" => HeaderName::ProxyAuthorization,
            "accept" => HeaderName::Accept,
            "accept-encoding" => HeaderName::AcceptEncoding,
            "accept-language" => HeaderName::AcceptLanguage,
            "min-expires" => HeaderName::MinExpires,
            "date" => HeaderName::Date,
            _ => HeaderName::Extension(raw.to_string()),
        }
    }

    /// Canonical on-the-wire long form, used by the serializer.
    pub fn canonical_str(&self) -> &str {
        match self {
            HeaderName::Via => "Via",
            HeaderName::Route => "Route",
            HeaderName::RecordRoute => "Record-Route",
            HeaderName::From => "From",
            HeaderName::To => "To",
            HeaderName::CallId => "Call-ID",
            HeaderName::CSeq => "CSeq",
            HeaderName::Contact => "Contact",
            HeaderName::MaxForwards => "Max-Forwards",
            HeaderName::UserAgent => "User-Agent",
            HeaderName::ContentType => "Content-Type",
            HeaderName::ContentLength => "Content-Length",
            HeaderName::ContentEncoding => "Content-Encoding",
            HeaderName::Subject => "Subject",
            HeaderName::Expires => "Expires",
            HeaderName::Allow => "Allow",
            HeaderName::Supported => "Supported",
            HeaderName::Require => "Require",
            HeaderName::Unsupported => "Unsupported",
            HeaderName::Event => "Event",
            HeaderName::SubscriptionState => "Subscription-State",
            HeaderName::ReferTo => "Refer-To",
            HeaderName::ReferredBy => "Referred-By",
            HeaderName::Replaces => "Replaces",
            HeaderName::WwwAuthenticate => "WWW-Authenticate",
            HeaderName::ProxyAuthenticate => "Proxy-Authenticate",
            HeaderName::Authorization => "Authorization",
            HeaderName::ProxyAuthorization => "Proxy-Authorization",
            HeaderName::Accept => "Accept",
            HeaderName::AcceptEncoding => "Accept-Encoding",
            HeaderName::AcceptLanguage => "Accept-Language",
            HeaderName::MinExpires => "Min-Expires",
            HeaderName::Date => "Date",
            HeaderName::Extension(s) => s.as_str(),
        }
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_short_forms() {
        assert_eq!(HeaderName::resolve("v"), HeaderName::Via);
        assert_eq!(HeaderName::resolve("F"), HeaderName::From);
        assert_eq!(HeaderName::resolve("Content-Length"), HeaderName::ContentLength);
        assert_eq!(HeaderName::resolve("l"), HeaderName::ContentLength);
    }

    #[test]
    fn unknown_header_becomes_extension() {
        assert_eq!(HeaderName::resolve("X-Custom"), HeaderName::Extension("X-Custom".to_string()));
    }
}
