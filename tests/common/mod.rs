//! Shared test infrastructure for claim publisher and attestation tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{AuthorityObject, Catalog, MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use suns::authority::ClaimAuthority;
use suns::config::PublisherConfig;
use suns::group_id;
use suns::record::{DomainRecord, SymmetryType};
use suns::zone::ClaimZone;

// --- Constants ---

pub const OWNER: &str = "alice";

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// Implements `ResponseHandler` so it can be passed to `Catalog::handle_request()`.
/// The response is serialized via `MessageResponse::destructive_emit()` and stored
/// as raw wire-format bytes, which can then be parsed with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- Config and zone builders ---

pub fn test_publisher_config() -> PublisherConfig {
    PublisherConfig::new("127.0.0.1:0".parse().unwrap())
}

/// Builds a claim zone whose groups attest valid unless told otherwise.
pub struct TestZoneBuilder {
    zone: ClaimZone,
}

impl TestZoneBuilder {
    pub fn new() -> Self {
        Self {
            zone: ClaimZone::new(),
        }
    }

    /// Publish the correct claim for a group at every member. Returns the group id.
    pub fn publish_group(&mut self, symmetry: SymmetryType, domains: &[&str]) -> String {
        let id = group_id::calculate(OWNER, symmetry.code(), domains).unwrap();
        for domain in domains {
            self.zone.publish_claim(domain, &id);
        }
        id
    }

    /// Publish an arbitrary claim value for one domain.
    pub fn publish_claim(&mut self, domain: &str, value: &str) {
        self.zone.publish_claim(domain, value);
    }

    /// Delegate `domain`'s claim label to `target` and publish `values` there.
    pub fn delegate(&mut self, domain: &str, target: &str, values: &[&str]) {
        self.zone.delegate(domain, target);
        for value in values {
            self.zone.publish_txt(target, value);
        }
    }

    pub fn build(self) -> ClaimZone {
        self.zone
    }
}

/// A stored record for `domain` in the group `group_id`.
pub fn record(
    symmetry: SymmetryType,
    domain: &str,
    group_id: &str,
    validate_time: DateTime<Utc>,
) -> DomainRecord {
    DomainRecord::new(OWNER, symmetry, domain, group_id, validate_time)
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` from a loopback source.
pub fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    let bytes = build_query_bytes(name, record_type, id);
    let msg = parse_message_request(&bytes);
    let src: SocketAddr = "127.0.0.1:12345".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

/// Build a Catalog with a ClaimAuthority serving `zone`.
pub fn build_catalog(config: PublisherConfig, zone: ClaimZone) -> Catalog {
    let authority = ClaimAuthority::new(config, zone).expect("failed to create ClaimAuthority");
    let origin = authority.origin().clone();
    let authority: Arc<dyn AuthorityObject> = Arc::new(authority);
    let mut catalog = Catalog::new();
    catalog.upsert(origin, vec![authority]);
    catalog
}

// --- Response helpers ---

/// Execute a query through the catalog and return the parsed response.
pub async fn execute_query(catalog: &Catalog, name: &str, record_type: RecordType, id: u16) -> Message {
    let request = build_request(name, record_type, id);
    let handler = TestResponseHandler::new();
    catalog.handle_request(&request, handler.clone()).await;
    handler.into_message()
}

/// Extract TXT values from a response.
pub fn extract_txt_values(msg: &Message) -> Vec<String> {
    let mut values: Vec<String> = msg
        .answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::TXT(txt) => Some(
                txt.txt_data()
                    .iter()
                    .map(|d| String::from_utf8_lossy(d).into_owned())
                    .collect::<String>(),
            ),
            _ => None,
        })
        .collect();
    values.sort();
    values
}

/// Extract CNAME targets from a response.
pub fn extract_cname_targets(msg: &Message) -> Vec<String> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::CNAME(cname) => Some(cname.0.to_utf8()),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}
