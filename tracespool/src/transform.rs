//! Grouping of individual spans into OTLP resource records.
//!
//! A telemetry pipeline usually hands over spans one by one, each tagged with
//! the resource and instrumentation scope that produced it. OTLP nests them:
//! one [`ResourceSpans`] per resource, one [`ScopeSpans`] per scope within
//! it. [`group_spans`] builds that nesting, keeping the first-seen order of
//! resources, scopes, and spans.

use crate::proto::{InstrumentationScope, Resource, ResourceSpans, ScopeSpans, Span};

/// A finished span together with its producer.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRecord {
    /// The resource that produced the span.
    pub resource: Resource,
    /// The instrumentation scope that produced the span.
    pub scope: InstrumentationScope,
    /// The span itself.
    pub span: Span,
}

/// Groups spans by resource, then by scope.
///
/// Resources and scopes are compared by value. The result has one entry per
/// distinct resource.
pub fn group_spans(records: Vec<SpanRecord>) -> Vec<ResourceSpans> {
    let mut grouped: Vec<ResourceSpans> = Vec::new();

    for SpanRecord {
        resource,
        scope,
        span,
    } in records
    {
        let resource_index = match grouped
            .iter()
            .position(|rs| rs.resource.as_ref() == Some(&resource))
        {
            Some(i) => i,
            None => {
                grouped.push(ResourceSpans {
                    resource: Some(resource),
                    scope_spans: Vec::new(),
                    schema_url: String::new(),
                });
                grouped.len() - 1
            }
        };

        let scope_spans = &mut grouped[resource_index].scope_spans;
        match scope_spans
            .iter_mut()
            .find(|ss| ss.scope.as_ref() == Some(&scope))
        {
            Some(ss) => ss.spans.push(span),
            None => scope_spans.push(ScopeSpans {
                scope: Some(scope),
                spans: vec![span],
                schema_url: String::new(),
            }),
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::KeyValue;

    fn resource(name: &str) -> Resource {
        Resource {
            attributes: vec![KeyValue::string("service.name", name)],
            dropped_attributes_count: 0,
        }
    }

    fn scope(name: &str) -> InstrumentationScope {
        InstrumentationScope {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn record(res: &str, sc: &str, span: &str) -> SpanRecord {
        SpanRecord {
            resource: resource(res),
            scope: scope(sc),
            span: Span {
                name: span.to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_group_spans_nesting_and_order() {
        let grouped = group_spans(vec![
            record("api", "http", "a"),
            record("db", "sql", "b"),
            record("api", "grpc", "c"),
            record("api", "http", "d"),
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].resource, Some(resource("api")));
        assert_eq!(grouped[0].scope_spans.len(), 2);
        let names: Vec<_> = grouped[0].scope_spans[0]
            .spans
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, ["a", "d"]);
        assert_eq!(grouped[0].scope_spans[1].spans[0].name, "c");
        assert_eq!(grouped[1].scope_spans[0].spans[0].name, "b");
    }

    #[test]
    fn test_group_spans_empty() {
        assert!(group_spans(Vec::new()).is_empty());
    }
}
