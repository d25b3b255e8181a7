use gantry_core::matcher::{FieldValidator, RouteMatcher};
use gantry_core::render::Vars;
use gantry_core::{Error, Request, Route};
use serde_json::{json, Value};

fn segment(pattern: &str) -> RouteMatcher {
    RouteMatcher::segment(pattern).unwrap()
}

#[test]
fn test_literal_route_exact_match_only() {
    let matcher = segment("/about");
    assert!(matcher.matches("/about").unwrap().is_some());
    assert!(matcher.matches("/about/").unwrap().is_none());
    assert!(matcher.matches("/aboutx").unwrap().is_none());
    assert!(matcher.matches("/other").unwrap().is_none());
}

#[test]
fn test_literal_fluid_route_prefix_match() {
    let mut matcher = segment("/docs");
    matcher.set_fluid(true);
    let caps = matcher.matches("/docs/guide/intro").unwrap().unwrap();
    assert_eq!(caps["match_url"], json!("/guide/intro"));
    assert!(matcher.matches("/api").unwrap().is_none());
}

#[test]
fn test_round_trip_build_then_match() {
    let matcher = segment("/archive/:year/:month");
    let mut vars = Vars::new();
    vars.insert("year".to_string(), json!("2023"));
    vars.insert("month".to_string(), json!("11"));

    let url = matcher.build(&vars).unwrap();
    assert_eq!(url, "/archive/2023/11");

    let caps = matcher.matches(&url).unwrap().unwrap();
    assert_eq!(caps["year"], json!("2023"));
    assert_eq!(caps["month"], json!("11"));
}

#[test]
fn test_field_validator_veto() {
    let mut matcher = segment("/count/:number");
    matcher.validate_fields(vec![("number", "[0-9]+")]);

    assert!(matcher.matches("/count/abc").unwrap().is_none());
    let caps = matcher.matches("/count/42").unwrap().unwrap();
    assert_eq!(caps["number"], json!("42"));
}

#[test]
fn test_callable_validator_sees_all_captures() {
    let mut matcher = segment("/range/:low/:high");
    matcher.validate_fields(vec![(
        "high",
        FieldValidator::func(|value, all, _field| {
            let high = value.as_str()?.parse::<i64>().ok()?;
            let low = all.get("low")?.as_str()?.parse::<i64>().ok()?;
            if low <= high {
                Some(Value::from(high))
            } else {
                None
            }
        }),
    )]);

    let caps = matcher.matches("/range/1/9").unwrap().unwrap();
    assert_eq!(caps["high"], json!(9));
    assert!(matcher.matches("/range/9/1").unwrap().is_none());
}

#[test]
fn test_converters_run_in_registration_order() {
    let mut matcher = segment("/user/:id");
    matcher.convert("id", |value, _field| {
        let id = value
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        json!(id)
    });
    matcher.convert("id", |value, _field| {
        let id = value.and_then(|v| v.as_u64()).unwrap_or(0);
        json!(id * 2)
    });

    let caps = matcher.matches("/user/21").unwrap().unwrap();
    assert_eq!(caps["id"], json!(42));
}

#[test]
fn test_regex_route_build_is_empty() {
    let matcher = RouteMatcher::regex(r"^/hiya/(?P<name>.+)$");
    assert_eq!(matcher.build(&Vars::new()).unwrap(), "");
}

#[test]
fn test_regex_fluid_strips_consumed_prefix() {
    let mut matcher = RouteMatcher::regex(r"^/mods/(?P<section>[a-z]+)");
    matcher.set_fluid(true);
    let caps = matcher.matches("/mods/core/settings").unwrap().unwrap();
    assert_eq!(caps["section"], json!("core"));
    assert_eq!(caps["match_url"], json!("/settings"));
}

#[test]
fn test_route_rewrites_match_url_for_sub_routing() {
    let mut route = Route::new("admin", segment("/admin"));
    route.add_handler(gantry_core::App::new());

    let request = Request::new("/admin/plugins");
    assert!(route.matches(&request).unwrap());
    assert_eq!(request.match_url().as_deref(), Some("/plugins"));
}

#[test]
fn test_route_without_validators_matches_on_pattern_alone() {
    let route = Route::new("bare", segment("/bare"));
    let request = Request::new("/bare");
    assert!(route.matches(&request).unwrap());
}

#[test]
fn test_method_filter_is_a_validator() {
    let mut route = Route::new("form", segment("/form"));
    route.post();

    assert!(!route.matches(&Request::new("/form")).unwrap());
    assert!(route
        .matches(&Request::with_method("/form", "post"))
        .unwrap());
}

#[test]
fn test_build_missing_variable_is_error() {
    let matcher = segment("/user/:id");
    assert!(matches!(
        matcher.build(&Vars::new()),
        Err(Error::MissingBuildVar(_))
    ));
}
