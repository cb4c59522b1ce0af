//! Request handlers for the authentication and accounting ports
//!
//! Both handlers are fail-closed: an internal fault on the auth path
//! produces a well-formed Access-Reject, never a malformed packet and
//! never an accidental Accept. The accounting path is the opposite
//! shape: it acknowledges everything it can parse so the NAS stops
//! retransmitting, and surfaces problems through anomaly counters and
//! events instead of error responses the NAS cannot act on.

use radgate_common::{CoreConfig, CounterSet, EventBus, OutboundEvent};
use radgate_lifecycle::{DisconnectDispatcher, DisconnectReason};
use radgate_proto::{
    accounting_request_authenticator, decrypt_user_password, merge_gigawords, seal_response,
    AcctStatusType, AcctTerminateCause, Attribute, AttributeType, Code, Packet,
};
use radgate_store::{
    AccountingRecord, AuthOutcome, CounterUpdate, CredentialEntry, InterimOutcome, NasEvent,
    PartitionStore, StoreRoot,
};
use radgate_tenant::{IdentityResolver, PartitionName};
use chrono::{DateTime, TimeZone, Utc};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state behind both UDP ports
pub struct Handlers {
    config: Arc<CoreConfig>,
    resolver: Arc<IdentityResolver>,
    root: Arc<StoreRoot>,
    dispatcher: Arc<DisconnectDispatcher>,
    events: EventBus,
    /// Authentication decision counters
    pub auth_stats: CounterSet,
    /// Accounting processing counters
    pub acct_stats: CounterSet,
}

impl Handlers {
    /// Wire the handlers to their collaborators
    pub fn new(
        config: Arc<CoreConfig>,
        resolver: Arc<IdentityResolver>,
        root: Arc<StoreRoot>,
        dispatcher: Arc<DisconnectDispatcher>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            resolver,
            root,
            dispatcher,
            events,
            auth_stats: CounterSet::new(),
            acct_stats: CounterSet::new(),
        }
    }

    /// Handle one datagram on the authentication port.
    ///
    /// Returns the wire response, or `None` when the datagram must be
    /// silently dropped (undecodable, wrong code).
    pub fn handle_auth(&self, data: &[u8], src: SocketAddr) -> Option<Vec<u8>> {
        let request = match Packet::decode(data) {
            Ok(p) => p,
            Err(e) => {
                debug!(src = %src, error = %e, "dropping undecodable auth datagram");
                self.auth_stats.inc_dropped();
                return None;
            }
        };
        if request.code != Code::AccessRequest {
            debug!(src = %src, code = ?request.code, "unexpected code on auth port");
            self.auth_stats.inc_dropped();
            return None;
        }

        let secret = self.config.secret_for(&src.ip()).as_bytes().to_vec();
        let decision = self.authenticate(&request, &secret, src);
        let response = match decision {
            AuthDecision::Accept(replies) => {
                self.auth_stats.inc_accepted();
                let mut resp = Packet::new(Code::AccessAccept, request.identifier, [0u8; 16]);
                for attr in replies {
                    resp.add_attribute(attr);
                }
                resp
            }
            AuthDecision::Reject => {
                self.auth_stats.inc_rejected();
                Packet::new(Code::AccessReject, request.identifier, [0u8; 16])
            }
        };
        self.seal(response, &request.authenticator, &secret)
    }

    /// The accept/reject decision for one Access-Request
    fn authenticate(&self, request: &Packet, secret: &[u8], src: SocketAddr) -> AuthDecision {
        let Some(username) = request.user_name() else {
            warn!(src = %src, "Access-Request without User-Name");
            return AuthDecision::Reject;
        };

        let resolution = match self.resolver.resolve(username) {
            Ok(r) => r,
            Err(_) => {
                info!(username = %username, src = %src, "rejecting unresolved identity");
                self.root.platform_postauth.record(
                    username,
                    AuthOutcome::Reject,
                    "no partition mapping",
                );
                return AuthDecision::Reject;
            }
        };

        let part = match self.root.partition(&resolution.partition) {
            Ok(part) => part,
            Err(e) => {
                // Fail closed: a broken partition rejects, it never
                // falls through to another tenant's data.
                warn!(username = %username, error = %e, "partition unavailable during auth");
                self.auth_stats.inc_errors();
                self.root.platform_postauth.record(
                    username,
                    AuthOutcome::Reject,
                    "partition unavailable",
                );
                return AuthDecision::Reject;
            }
        };

        let Some(stored) = part.credentials.cleartext_password(username) else {
            part.postauth
                .record(username, AuthOutcome::Reject, "no credentials on file");
            return AuthDecision::Reject;
        };
        let presented = request
            .user_password()
            .and_then(|cipher| decrypt_user_password(cipher, secret, &request.authenticator));
        let Some(presented) = presented else {
            part.postauth
                .record(username, AuthOutcome::Reject, "missing or undecryptable password");
            return AuthDecision::Reject;
        };
        if presented != stored {
            info!(username = %username, src = %src, "credential mismatch");
            part.postauth
                .record(username, AuthOutcome::Reject, "credential mismatch");
            return AuthDecision::Reject;
        }

        let reply_rows = part.credentials.reply_items(username);
        let replies = translate_reply_items(&reply_rows);
        let detail = reply_rows
            .iter()
            .map(|r| format!("{}={}", r.attribute, r.value))
            .collect::<Vec<_>>()
            .join(", ");
        part.postauth.record(username, AuthOutcome::Accept, detail);
        info!(username = %username, partition = %resolution.partition, "access accepted");
        AuthDecision::Accept(replies)
    }

    /// Handle one datagram on the accounting port.
    pub fn handle_acct(&self, data: &[u8], src: SocketAddr) -> Option<Vec<u8>> {
        let request = match Packet::decode(data) {
            Ok(p) => p,
            Err(e) => {
                debug!(src = %src, error = %e, "dropping undecodable acct datagram");
                self.acct_stats.inc_dropped();
                return None;
            }
        };
        if request.code != Code::AccountingRequest {
            debug!(src = %src, code = ?request.code, "unexpected code on acct port");
            self.acct_stats.inc_dropped();
            return None;
        }

        let secret = self.config.secret_for(&src.ip()).as_bytes().to_vec();
        if accounting_request_authenticator(&request, &secret) != request.authenticator {
            warn!(src = %src, "accounting request authenticator mismatch, dropping");
            self.acct_stats.inc_dropped();
            return None;
        }
        let Some(status) = request.acct_status_type() else {
            warn!(src = %src, "Accounting-Request without valid Acct-Status-Type, dropping");
            self.acct_stats.inc_dropped();
            return None;
        };

        match status {
            AcctStatusType::AccountingOn | AcctStatusType::AccountingOff => {
                self.record_nas_event(&request, status, src)
            }
            AcctStatusType::Start | AcctStatusType::InterimUpdate | AcctStatusType::Stop => {
                self.record_session_event(&request, status, src)
            }
        }
        self.acct_stats.inc_accepted();

        // The NAS always gets an acknowledgement once the packet
        // authenticated; anything that went wrong above is our problem
        // to alert on, not the NAS's to retransmit.
        let response = Packet::new(Code::AccountingResponse, request.identifier, [0u8; 16]);
        self.seal(response, &request.authenticator, &secret)
    }

    /// Accounting-On/Off: NAS-level, not tied to any tenant
    fn record_nas_event(&self, request: &Packet, status: AcctStatusType, src: SocketAddr) {
        let nas_ip = request.nas_ip().unwrap_or_else(|| match src.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        });
        let cause = request
            .u32_attribute(AttributeType::AcctTerminateCause)
            .and_then(AcctTerminateCause::from_u32)
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| {
                match status {
                    AcctStatusType::AccountingOn => "Accounting-On",
                    _ => "Accounting-Off",
                }
                .to_string()
            });
        info!(nas = %nas_ip, cause = %cause, "NAS accounting event");
        self.root.nas_events.record(NasEvent {
            nas_ip,
            cause,
            at: event_time(request),
        });
    }

    /// Start/Interim/Stop: per-subscriber accounting plus session upkeep
    fn record_session_event(&self, request: &Packet, status: AcctStatusType, src: SocketAddr) {
        let Some(unique_id) = request.acct_session_id().map(str::to_string) else {
            self.anomaly(None, "?", "accounting event without Acct-Session-Id");
            return;
        };
        let Some(username) = request.user_name().map(str::to_string) else {
            self.anomaly(None, &unique_id, "accounting event without User-Name");
            return;
        };

        // Revoked identities still resolve here so their final Stop
        // lands in the right partition.
        let resolution = match self.resolver.resolve_any(&username) {
            Ok(r) => r,
            Err(_) => {
                self.anomaly(
                    None,
                    &unique_id,
                    format!("accounting for unknown username {username}"),
                );
                return;
            }
        };
        let part = match self.root.partition(&resolution.partition) {
            Ok(part) => part,
            Err(e) => {
                self.acct_stats.inc_errors();
                self.anomaly(
                    Some(resolution.partition.to_string()),
                    &unique_id,
                    format!("partition unavailable: {e}"),
                );
                return;
            }
        };

        let now = event_time(request);
        match status {
            AcctStatusType::Start => {
                let nas_ip = request.nas_ip().unwrap_or_else(|| match src.ip() {
                    IpAddr::V4(v4) => v4,
                    IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
                });
                let created = part.accounting.start(AccountingRecord {
                    unique_id: unique_id.clone(),
                    username: username.clone(),
                    nas_ip,
                    framed_ip: request.framed_ip(),
                    start_time: now,
                    update_time: None,
                    stop_time: None,
                    session_time: 0,
                    input_octets: 0,
                    output_octets: 0,
                    terminate_cause: None,
                });
                if !created {
                    self.acct_stats.inc_anomalies();
                    return;
                }
                let mac = request
                    .attribute(AttributeType::CallingStationId)
                    .and_then(|a| a.as_str())
                    .map(str::to_string);
                part.sessions.activate(&username, &unique_id, nas_ip, mac, now);
            }
            AcctStatusType::InterimUpdate => {
                let update = counter_update(request);
                let outcome = part.accounting.interim(&unique_id, update, now);
                self.note_outcome(&resolution.partition, &unique_id, outcome);
                self.apply_usage(&part, &resolution.partition, &username, request);
            }
            AcctStatusType::Stop => {
                let update = counter_update(request);
                let cause = request
                    .u32_attribute(AttributeType::AcctTerminateCause)
                    .and_then(AcctTerminateCause::from_u32)
                    .map(|c| c.as_str().to_string());
                let outcome = part.accounting.stop(&unique_id, update, now, cause);
                self.note_outcome(&resolution.partition, &unique_id, outcome);
                self.apply_usage(&part, &resolution.partition, &username, request);
            }
            // On/Off handled by the caller
            _ => {}
        }
    }

    /// Push the reported byte counters into the session store and act
    /// on a cap breach the moment the crossing update arrives.
    fn apply_usage(
        &self,
        part: &Arc<PartitionStore>,
        partition: &PartitionName,
        username: &str,
        request: &Packet,
    ) {
        let bytes_in = merge_gigawords(
            request.u32_attribute(AttributeType::AcctInputOctets).unwrap_or(0),
            request.u32_attribute(AttributeType::AcctInputGigawords),
        );
        let bytes_out = merge_gigawords(
            request.u32_attribute(AttributeType::AcctOutputOctets).unwrap_or(0),
            request.u32_attribute(AttributeType::AcctOutputGigawords),
        );
        if let Some(breach) = part.sessions.record_usage(username, bytes_in, bytes_out) {
            info!(
                username = %username,
                total = breach.session.total_bytes(),
                limit = breach.limit,
                "dispatching data-cap disconnect"
            );
            self.dispatcher
                .dispatch(partition, &breach.session, DisconnectReason::DataLimitExceeded);
        }
    }

    fn note_outcome(&self, partition: &PartitionName, unique_id: &str, outcome: InterimOutcome) {
        match outcome {
            InterimOutcome::Applied => {}
            InterimOutcome::Missing => {
                self.anomaly(
                    Some(partition.to_string()),
                    unique_id,
                    "update for a session never started",
                );
            }
            InterimOutcome::AlreadyStopped => {
                self.acct_stats.inc_anomalies();
            }
        }
    }

    fn anomaly(&self, partition: Option<String>, unique_id: &str, detail: impl Into<String>) {
        let detail = detail.into();
        warn!(unique_id = %unique_id, detail = %detail, "accounting anomaly");
        self.acct_stats.inc_anomalies();
        self.events.emit(OutboundEvent::AccountingAnomaly {
            partition,
            unique_id: unique_id.to_string(),
            detail,
        });
    }

    fn seal(&self, mut response: Packet, req_auth: &[u8; 16], secret: &[u8]) -> Option<Vec<u8>> {
        match seal_response(&mut response, req_auth, secret) {
            Ok(wire) => Some(wire),
            Err(e) => {
                // Over-long reply sets; drop rather than send garbage
                warn!(error = %e, "failed to encode response");
                self.auth_stats.inc_errors();
                None
            }
        }
    }
}

enum AuthDecision {
    Accept(Vec<Attribute>),
    Reject,
}

/// Stored reply rows to wire attributes. Rows naming attributes the
/// translation does not know are skipped with a log line so one bad
/// row cannot block a subscriber.
fn translate_reply_items(rows: &[CredentialEntry]) -> Vec<Attribute> {
    let mut attrs = Vec::with_capacity(rows.len());
    for row in rows {
        let attr = match row.attribute.as_str() {
            "Session-Timeout" => row.value.parse().ok().map(|v| Attribute::u32(AttributeType::SessionTimeout, v)),
            "Service-Type" => row.value.parse().ok().map(|v| Attribute::u32(AttributeType::ServiceType, v)),
            "Framed-IP-Address" => row
                .value
                .parse::<Ipv4Addr>()
                .ok()
                .map(|ip| Attribute::ipv4(AttributeType::FramedIpAddress, ip)),
            "Reply-Message" => Attribute::string(AttributeType::ReplyMessage, &row.value).ok(),
            _ => None,
        };
        match attr {
            Some(attr) => attrs.push(attr),
            None => debug!(
                attribute = %row.attribute,
                value = %row.value,
                "skipping untranslatable reply item"
            ),
        }
    }
    attrs
}

/// Event-Timestamp when the NAS sent one, otherwise receive time
fn event_time(request: &Packet) -> DateTime<Utc> {
    request
        .u32_attribute(AttributeType::EventTimestamp)
        .and_then(|epoch| Utc.timestamp_opt(epoch as i64, 0).single())
        .unwrap_or_else(Utc::now)
}

fn counter_update(request: &Packet) -> CounterUpdate {
    CounterUpdate {
        framed_ip: request.framed_ip(),
        session_time: request.u32_attribute(AttributeType::AcctSessionTime),
        input_octets: request
            .u32_attribute(AttributeType::AcctInputOctets)
            .map(|o| merge_gigawords(o, request.u32_attribute(AttributeType::AcctInputGigawords))),
        output_octets: request
            .u32_attribute(AttributeType::AcctOutputOctets)
            .map(|o| merge_gigawords(o, request.u32_attribute(AttributeType::AcctOutputGigawords))),
    }
}
