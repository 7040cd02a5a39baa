//! Loose vs strict routing (spec §4.5) and Record-Route → route-set
//! construction (spec §3 "Dialog": "route set ... reversed when we are
//! UAS").

use sipswitch_sip_core::prelude::Uri;

/// Build the route set a UAC (or UAS, already reversed by the caller)
/// sees from a request/response's ordered `Record-Route` values.
pub fn route_set_from_record_route(record_route: &[String]) -> Vec<Uri> {
    record_route.iter().filter_map(|raw| Uri::parse(raw).ok()).collect()
}

/// Reverse the route set when we are the UAS (spec §3: "reversed when we
/// are UAS") since Record-Route is recorded in the direction the request
/// travelled.
pub fn reverse_for_uas(mut route_set: Vec<Uri>) -> Vec<Uri> {
    route_set.reverse();
    route_set
}

/// Where to send the next in-dialog request: either loose routing (the
/// route set is used verbatim, remote target is the request-URI) or
/// strict routing (first Route entry becomes the request-URI, the
/// remainder become `Route` headers, and the remote target is appended
/// as the last Route) (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub request_uri: Uri,
    pub route_headers: Vec<Uri>,
}

pub fn resolve_route(route_set: &[Uri], remote_target: &Uri) -> RouteDecision {
    match route_set.first() {
        Some(first) if first.is_loose_route() => RouteDecision {
            request_uri: remote_target.clone(),
            route_headers: route_set.to_vec(),
        },
        Some(first) => {
            let mut route_headers = route_set[1..].to_vec();
            route_headers.push(remote_target.clone());
            RouteDecision { request_uri: first.clone(), route_headers }
        }
        None => RouteDecision { request_uri: remote_target.clone(), route_headers: Vec::new() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_routing_keeps_remote_target_as_request_uri() {
        let route_set = vec![Uri::parse("<sip:proxy.example.com;lr>").unwrap()];
        let target = Uri::parse("sip:bob@192.0.2.4").unwrap();
        let decision = resolve_route(&route_set, &target);
        assert_eq!(decision.request_uri, target);
        assert_eq!(decision.route_headers, route_set);
    }

    #[test]
    fn strict_routing_promotes_first_route_to_request_uri() {
        let route_set = vec![
            Uri::parse("sip:proxy1.example.com").unwrap(),
            Uri::parse("sip:proxy2.example.com").unwrap(),
        ];
        let target = Uri::parse("sip:bob@192.0.2.4").unwrap();
        let decision = resolve_route(&route_set, &target);
        assert_eq!(decision.request_uri, Uri::parse("sip:proxy1.example.com").unwrap());
        assert_eq!(decision.route_headers, vec![Uri::parse("sip:proxy2.example.com").unwrap(), target]);
    }

    #[test]
    fn reverse_for_uas_flips_order() {
        let route_set = vec![Uri::new("a"), Uri::new("b")];
        assert_eq!(reverse_for_uas(route_set), vec![Uri::new("b"), Uri::new("a")]);
    }
}
