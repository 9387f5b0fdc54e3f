//! OpenTelemetry trace protobuf types.
//!
//! Hand-written types matching `opentelemetry/proto/trace/v1/trace.proto`,
//! `common/v1/common.proto`, `resource/v1/resource.proto`, and the trace
//! collector service request. Using prost derives avoids the need for protoc
//! and proto file management. Field tags follow the upstream definitions so
//! encoded records interoperate with any OTLP collector.
//!
//! Each record in a spool segment file is one encoded [`ResourceSpans`].

/// Request body of the OTLP trace export call (`/v1/traces`).
#[derive(Clone, PartialEq, prost::Message)]
pub struct ExportTraceServiceRequest {
    /// Spans grouped by resource.
    #[prost(message, repeated, tag = "1")]
    pub resource_spans: Vec<ResourceSpans>,
}

/// A collection of spans from one resource.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ResourceSpans {
    /// The resource the spans were produced by.
    #[prost(message, optional, tag = "1")]
    pub resource: Option<Resource>,
    /// Spans grouped by instrumentation scope.
    #[prost(message, repeated, tag = "2")]
    pub scope_spans: Vec<ScopeSpans>,
    /// Schema URL of the resource data.
    #[prost(string, tag = "3")]
    pub schema_url: String,
}

/// A collection of spans produced by one instrumentation scope.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ScopeSpans {
    /// The instrumentation scope.
    #[prost(message, optional, tag = "1")]
    pub scope: Option<InstrumentationScope>,
    /// The spans.
    #[prost(message, repeated, tag = "2")]
    pub spans: Vec<Span>,
    /// Schema URL of the span data.
    #[prost(string, tag = "3")]
    pub schema_url: String,
}

/// A single operation within a trace.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Span {
    /// 16-byte trace identifier.
    #[prost(bytes = "vec", tag = "1")]
    pub trace_id: Vec<u8>,
    /// 8-byte span identifier.
    #[prost(bytes = "vec", tag = "2")]
    pub span_id: Vec<u8>,
    /// W3C trace-state header value.
    #[prost(string, tag = "3")]
    pub trace_state: String,
    /// Parent span identifier, empty for root spans.
    #[prost(bytes = "vec", tag = "4")]
    pub parent_span_id: Vec<u8>,
    /// W3C trace flags.
    #[prost(fixed32, tag = "16")]
    pub flags: u32,
    /// Operation name.
    #[prost(string, tag = "5")]
    pub name: String,
    /// Span kind, see [`SpanKind`].
    #[prost(enumeration = "SpanKind", tag = "6")]
    pub kind: i32,
    /// Start time in nanoseconds since the UNIX epoch.
    #[prost(fixed64, tag = "7")]
    pub start_time_unix_nano: u64,
    /// End time in nanoseconds since the UNIX epoch.
    #[prost(fixed64, tag = "8")]
    pub end_time_unix_nano: u64,
    /// Span attributes.
    #[prost(message, repeated, tag = "9")]
    pub attributes: Vec<KeyValue>,
    /// Number of attributes dropped by the producer.
    #[prost(uint32, tag = "10")]
    pub dropped_attributes_count: u32,
    /// Timed events.
    #[prost(message, repeated, tag = "11")]
    pub events: Vec<span::Event>,
    /// Number of events dropped by the producer.
    #[prost(uint32, tag = "12")]
    pub dropped_events_count: u32,
    /// Links to other spans.
    #[prost(message, repeated, tag = "13")]
    pub links: Vec<span::Link>,
    /// Number of links dropped by the producer.
    #[prost(uint32, tag = "14")]
    pub dropped_links_count: u32,
    /// Final status.
    #[prost(message, optional, tag = "15")]
    pub status: Option<Status>,
}

/// Nested span message types.
pub mod span {
    /// A time-stamped annotation on a span.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Event {
        /// Event time in nanoseconds since the UNIX epoch.
        #[prost(fixed64, tag = "1")]
        pub time_unix_nano: u64,
        /// Event name.
        #[prost(string, tag = "2")]
        pub name: String,
        /// Event attributes.
        #[prost(message, repeated, tag = "3")]
        pub attributes: Vec<super::KeyValue>,
        /// Number of attributes dropped by the producer.
        #[prost(uint32, tag = "4")]
        pub dropped_attributes_count: u32,
    }

    /// A pointer from this span to another span.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Link {
        /// Linked trace identifier.
        #[prost(bytes = "vec", tag = "1")]
        pub trace_id: Vec<u8>,
        /// Linked span identifier.
        #[prost(bytes = "vec", tag = "2")]
        pub span_id: Vec<u8>,
        /// Linked span's trace-state.
        #[prost(string, tag = "3")]
        pub trace_state: String,
        /// Link attributes.
        #[prost(message, repeated, tag = "4")]
        pub attributes: Vec<super::KeyValue>,
        /// Number of attributes dropped by the producer.
        #[prost(uint32, tag = "5")]
        pub dropped_attributes_count: u32,
        /// W3C trace flags of the linked span.
        #[prost(fixed32, tag = "6")]
        pub flags: u32,
    }
}

/// Type of span relative to its caller/callee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SpanKind {
    /// Kind not specified.
    Unspecified = 0,
    /// Internal operation.
    Internal = 1,
    /// Server side of a synchronous call.
    Server = 2,
    /// Client side of a synchronous call.
    Client = 3,
    /// Producer of an asynchronous message.
    Producer = 4,
    /// Consumer of an asynchronous message.
    Consumer = 5,
}

/// Span completion status.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Status {
    /// Developer-facing status message.
    #[prost(string, tag = "2")]
    pub message: String,
    /// Status code, see [`StatusCode`].
    #[prost(enumeration = "StatusCode", tag = "3")]
    pub code: i32,
}

/// Span status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum StatusCode {
    /// Status not set.
    Unset = 0,
    /// Operation completed successfully.
    Ok = 1,
    /// Operation failed.
    Error = 2,
}

/// The entity producing telemetry.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Resource {
    /// Resource attributes (e.g. `service.name`).
    #[prost(message, repeated, tag = "1")]
    pub attributes: Vec<KeyValue>,
    /// Number of attributes dropped by the producer.
    #[prost(uint32, tag = "2")]
    pub dropped_attributes_count: u32,
}

/// The instrumentation library that produced the spans.
#[derive(Clone, PartialEq, prost::Message)]
pub struct InstrumentationScope {
    /// Scope name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Scope version.
    #[prost(string, tag = "2")]
    pub version: String,
    /// Scope attributes.
    #[prost(message, repeated, tag = "3")]
    pub attributes: Vec<KeyValue>,
    /// Number of attributes dropped by the producer.
    #[prost(uint32, tag = "4")]
    pub dropped_attributes_count: u32,
}

/// A key-value attribute pair.
#[derive(Clone, PartialEq, prost::Message)]
pub struct KeyValue {
    /// Attribute key.
    #[prost(string, tag = "1")]
    pub key: String,
    /// Attribute value.
    #[prost(message, optional, tag = "2")]
    pub value: Option<AnyValue>,
}

impl KeyValue {
    /// Builds a string-valued attribute.
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(AnyValue {
                value: Some(any_value::Value::StringValue(value.into())),
            }),
        }
    }

    /// Builds an integer-valued attribute.
    pub fn int(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            value: Some(AnyValue {
                value: Some(any_value::Value::IntValue(value)),
            }),
        }
    }
}

/// A dynamically typed attribute value.
#[derive(Clone, PartialEq, prost::Message)]
pub struct AnyValue {
    /// The value, absent when unset.
    #[prost(oneof = "any_value::Value", tags = "1, 2, 3, 4, 5, 6, 7")]
    pub value: Option<any_value::Value>,
}

/// Variants of [`AnyValue`].
pub mod any_value {
    /// The concrete value held by an [`AnyValue`](super::AnyValue).
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        /// UTF-8 string.
        #[prost(string, tag = "1")]
        StringValue(String),
        /// Boolean.
        #[prost(bool, tag = "2")]
        BoolValue(bool),
        /// Signed 64-bit integer.
        #[prost(int64, tag = "3")]
        IntValue(i64),
        /// Double-precision float.
        #[prost(double, tag = "4")]
        DoubleValue(f64),
        /// Array of values.
        #[prost(message, tag = "5")]
        ArrayValue(super::ArrayValue),
        /// Nested key-value list.
        #[prost(message, tag = "6")]
        KvlistValue(super::KeyValueList),
        /// Raw bytes.
        #[prost(bytes = "vec", tag = "7")]
        BytesValue(Vec<u8>),
    }
}

/// A list of values.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ArrayValue {
    /// The values.
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<AnyValue>,
}

/// A list of key-value pairs.
#[derive(Clone, PartialEq, prost::Message)]
pub struct KeyValueList {
    /// The pairs.
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<KeyValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_span_fields_survive_encoding() {
        let record = ResourceSpans {
            resource: Some(Resource {
                attributes: vec![KeyValue::string("service.name", "checkout")],
                dropped_attributes_count: 0,
            }),
            scope_spans: vec![ScopeSpans {
                scope: Some(InstrumentationScope {
                    name: "tracespool-test".to_string(),
                    ..Default::default()
                }),
                spans: vec![Span {
                    trace_id: vec![1; 16],
                    span_id: vec![2; 8],
                    name: "GET /cart".to_string(),
                    kind: SpanKind::Server as i32,
                    start_time_unix_nano: 1_700_000_000_000_000_000,
                    end_time_unix_nano: 1_700_000_000_500_000_000,
                    attributes: vec![KeyValue::int("http.status_code", 200)],
                    status: Some(Status {
                        message: String::new(),
                        code: StatusCode::Ok as i32,
                    }),
                    ..Default::default()
                }],
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        };

        let bytes = record.encode_to_vec();
        let decoded = ResourceSpans::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.scope_spans[0].spans[0].kind(), SpanKind::Server);
    }

    #[test]
    fn test_trace_id_is_field_one_bytes() {
        // Wire check against the upstream proto: field 1, wire type 2.
        let span = Span {
            trace_id: vec![0xAB; 16],
            ..Default::default()
        };
        let bytes = span.encode_to_vec();
        assert_eq!(bytes[0], (1 << 3) | 2);
        assert_eq!(bytes[1], 16);
    }
}
