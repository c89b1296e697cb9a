//! Hickory DNS authority serving published claims.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::{CNAME, NS, SOA, TXT};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordSet, RecordType};
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupError, LookupOptions, LookupRecords, MessageRequest,
    UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::PublisherConfig;
use crate::metrics::{self, QueryResult, Timer};
use crate::zone::ClaimZone;

/// Authority answering TXT and CNAME queries from a [`ClaimZone`].
pub struct ClaimAuthority {
    origin: LowerName,
    zone: ClaimZone,
    config: Arc<PublisherConfig>,
}

impl ClaimAuthority {
    /// Create a new authority for the given configuration and zone.
    pub fn new(config: PublisherConfig, zone: ClaimZone) -> Result<Self, hickory_proto::ProtoError> {
        let origin = Name::from_ascii(&config.origin)?.into();

        Ok(Self {
            origin,
            zone,
            config: Arc::new(config),
        })
    }

    fn record_set(&self, name: Name, rtype: RecordType, rdatas: Vec<RData>) -> RecordSet {
        let mut record_set = RecordSet::new(name.clone(), rtype, 0);
        for rdata in rdatas {
            let mut record = Record::from_rdata(name.clone(), self.config.ttl, rdata);
            record.set_dns_class(DNSClass::IN);
            record_set.insert(record, 0);
        }
        record_set
    }

    /// Build the SOA record for this zone.
    fn build_soa_record(&self) -> RecordSet {
        let soa = SOA::new(
            Name::from_ascii(&self.config.soa.mname).unwrap_or_else(|_| Name::root()),
            Name::from_ascii(&self.config.soa.rname).unwrap_or_else(|_| Name::root()),
            self.zone.serial(),
            self.config.soa.refresh as i32,
            self.config.soa.retry as i32,
            self.config.soa.expire as i32,
            self.config.soa.minimum,
        );
        self.record_set(Name::from(self.origin.clone()), RecordType::SOA, vec![RData::SOA(soa)])
    }

    /// Build an NS record for this zone.
    fn build_ns_record(&self) -> RecordSet {
        let ns_name = Name::from_ascii(&self.config.soa.mname).unwrap_or_else(|_| Name::root());
        self.record_set(
            Name::from(self.origin.clone()),
            RecordType::NS,
            vec![RData::NS(NS(ns_name))],
        )
    }

    fn answer(
        &self,
        name: &LowerName,
        rtype: RecordType,
        rdatas: Vec<RData>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<LookupRecords> {
        let record_set = Arc::new(self.record_set(Name::from(name.clone()), rtype, rdatas));
        LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)))
    }

    /// CNAME record at `name`; the resolver follows it, not the authority.
    fn alias_answer(
        &self,
        name: &LowerName,
        lookup_name: &str,
        target: &str,
        rtype_str: &str,
        timer: Timer,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<LookupRecords> {
        let target = match Name::from_ascii(format!("{target}.")) {
            Ok(target) => target,
            Err(e) => {
                debug!(name = %lookup_name, %target, error = %e, "CNAME target is not a valid name");
                return LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::ServFail)));
            }
        };
        debug!(name = %lookup_name, %target, rtype = %rtype_str, "returning CNAME");
        metrics::record_query(rtype_str, QueryResult::Success, timer.elapsed());
        self.answer(
            name,
            RecordType::CNAME,
            vec![RData::CNAME(CNAME(target))],
            lookup_options,
        )
    }

    /// NoData for names the zone knows about, NXDomain otherwise.
    fn empty(&self, lookup_name: &str, rtype_str: &str, timer: Timer) -> LookupControlFlow<LookupRecords> {
        if self.zone.has_name(lookup_name) {
            metrics::record_query(rtype_str, QueryResult::NoData, timer.elapsed());
            LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
        } else {
            metrics::record_query(rtype_str, QueryResult::NxDomain, timer.elapsed());
            LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NXDomain)))
        }
    }
}

#[async_trait]
impl Authority for ClaimAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        let timer = Timer::start();
        let rtype_str = format!("{:?}", rtype);

        let name_str = name.to_string();
        let lookup_name = name_str.trim_end_matches('.');

        trace!(name = %lookup_name, rtype = ?rtype, "DNS lookup");

        // A name that owns a CNAME answers every other type with it.
        if !matches!(rtype, RecordType::CNAME | RecordType::SOA | RecordType::NS) {
            if let Some(target) = self.zone.lookup_cname(lookup_name) {
                return self.alias_answer(name, lookup_name, &target, &rtype_str, timer, lookup_options);
            }
        }

        match rtype {
            RecordType::TXT => {
                let values = self.zone.lookup_txt(lookup_name);
                if values.is_empty() {
                    debug!(name = %lookup_name, "TXT lookup: no records found");
                    return self.empty(lookup_name, &rtype_str, timer);
                }
                debug!(name = %lookup_name, count = values.len(), "TXT lookup: returning records");
                metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
                let rdatas = values
                    .into_iter()
                    .map(|value| RData::TXT(TXT::new(vec![value])))
                    .collect();
                self.answer(name, rtype, rdatas, lookup_options)
            }
            RecordType::CNAME => {
                let Some(target) = self.zone.lookup_cname(lookup_name) else {
                    debug!(name = %lookup_name, "CNAME lookup: no records found");
                    return self.empty(lookup_name, &rtype_str, timer);
                };
                self.alias_answer(name, lookup_name, &target, &rtype_str, timer, lookup_options)
            }
            RecordType::SOA => {
                debug!(name = %lookup_name, "SOA lookup");
                metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
                let record_set = Arc::new(self.build_soa_record());
                LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)))
            }
            RecordType::NS => {
                debug!(name = %lookup_name, "NS lookup");
                metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
                let record_set = Arc::new(self.build_ns_record());
                LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)))
            }
            _ => {
                trace!(name = %lookup_name, rtype = ?rtype, "Unsupported record type");
                self.empty(lookup_name, &rtype_str, timer)
            }
        }
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.lookup(
            request_info.query.name(),
            request_info.query.query_type(),
            lookup_options,
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        // DNSSEC not supported
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        // Dynamic updates not supported
        Err(ResponseCode::NotImp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{Header, LowerQuery, Query};
    use hickory_server::proto::xfer::Protocol;
    use std::net::SocketAddr;

    fn test_config() -> PublisherConfig {
        PublisherConfig::new("127.0.0.1:5353".parse().unwrap())
    }

    fn lower(name: &str) -> LowerName {
        Name::from_ascii(name).unwrap().into()
    }

    fn txt_values(result: LookupControlFlow<LookupRecords>) -> Vec<String> {
        let LookupControlFlow::Break(Ok(records)) = result else {
            panic!("expected records");
        };
        records
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
            .collect()
    }

    #[tokio::test]
    async fn test_lookup_txt_returns_claims() {
        let zone = ClaimZone::new();
        zone.publish_claim("aba", "v1:a:x:y");
        zone.publish_claim("aba", "v1:e:x:z");
        let authority = ClaimAuthority::new(test_config(), zone).unwrap();

        let result = authority
            .lookup(&lower("_suns.aba."), RecordType::TXT, LookupOptions::default())
            .await;

        let mut values = txt_values(result);
        values.sort();
        assert_eq!(values, vec!["v1:a:x:y", "v1:e:x:z"]);
    }

    #[tokio::test]
    async fn test_lookup_txt_nxdomain_for_unknown() {
        let authority = ClaimAuthority::new(test_config(), ClaimZone::new()).unwrap();

        let result = authority
            .lookup(&lower("_suns.unknown."), RecordType::TXT, LookupOptions::default())
            .await;

        assert!(matches!(
            result,
            LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NXDomain)))
        ));
    }

    fn cname_targets(result: LookupControlFlow<LookupRecords>) -> Vec<String> {
        let LookupControlFlow::Break(Ok(records)) = result else {
            panic!("expected records");
        };
        records
            .iter()
            .filter_map(|r| match r.data() {
                RData::CNAME(cname) => Some(cname.0.to_utf8()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_lookup_txt_on_delegated_label_returns_cname() {
        let zone = ClaimZone::new();
        zone.delegate("aba", "claims.example");
        let authority = ClaimAuthority::new(test_config(), zone).unwrap();

        for rtype in [RecordType::TXT, RecordType::A] {
            let result = authority
                .lookup(&lower("_suns.aba."), rtype, LookupOptions::default())
                .await;
            assert_eq!(cname_targets(result), vec!["claims.example."], "{rtype:?}");
        }
    }

    #[tokio::test]
    async fn test_lookup_cname_returns_target() {
        let zone = ClaimZone::new();
        zone.delegate("aba", "claims.example");
        let authority = ClaimAuthority::new(test_config(), zone).unwrap();

        let result = authority
            .lookup(&lower("_suns.aba."), RecordType::CNAME, LookupOptions::default())
            .await;

        assert_eq!(cname_targets(result), vec!["claims.example."]);
    }

    #[tokio::test]
    async fn test_lookup_soa() {
        let authority = ClaimAuthority::new(test_config(), ClaimZone::new()).unwrap();

        let result = authority
            .lookup(&lower("."), RecordType::SOA, LookupOptions::default())
            .await;

        assert!(matches!(result, LookupControlFlow::Break(Ok(_))));
    }

    #[test]
    fn test_custom_origin() {
        let config = PublisherConfig {
            origin: "claims.example.com".to_string(),
            ..test_config()
        };
        let authority = ClaimAuthority::new(config, ClaimZone::new()).unwrap();
        assert_eq!(authority.origin(), &lower("claims.example.com"));
    }

    #[tokio::test]
    async fn test_search_routes_to_lookup() {
        let zone = ClaimZone::new();
        zone.publish_claim("noon", "v1:a:x:y");
        let authority = ClaimAuthority::new(test_config(), zone).unwrap();

        let src: SocketAddr = "127.0.0.1:12345".parse().unwrap();
        let query = Query::query(Name::from_ascii("_suns.noon.").unwrap(), RecordType::TXT);
        let lower_query = LowerQuery::from(query);
        let header = Header::new();
        let request_info = RequestInfo::new(src, Protocol::Udp, &header, &lower_query);

        let result = authority.search(request_info, LookupOptions::default()).await;
        assert_eq!(txt_values(result), vec!["v1:a:x:y"]);
    }
}
