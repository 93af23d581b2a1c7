//! Table monitors
//!
//! A monitor is registered before its `monitor` request is sent, so that an
//! `update` racing the reply is buffered rather than lost. Once the reply is
//! in, the subscription sees the initial contents, then anything buffered,
//! then live updates, all through one delivery task per subscription.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ovsdb_jsonrpc::{JsonRpcClient, JsonRpcError, NotificationHandler};
use serde::Serialize;
use serde_json::{json, Value as Json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{OvsdbError, Result};
use crate::notation::Row;

/// Caller-chosen monitor id, echoed back in every `update`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(String);

impl MonitorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MonitorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MonitorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Which kinds of change a monitor reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonitorSelect {
    pub initial: bool,
    pub insert: bool,
    pub delete: bool,
    pub modify: bool,
}

impl Default for MonitorSelect {
    fn default() -> Self {
        Self {
            initial: true,
            insert: true,
            delete: true,
            modify: true,
        }
    }
}

/// What to monitor in one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<MonitorSelect>,
}

impl MonitorRequest {
    /// All columns, all change kinds
    pub fn all() -> Self {
        Self::default()
    }

    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: Some(columns.into_iter().map(Into::into).collect()),
            select: None,
        }
    }

    pub fn with_select(mut self, select: MonitorSelect) -> Self {
        self.select = Some(select);
        self
    }
}

/// Table name to request
pub type MonitorRequests = BTreeMap<String, MonitorRequest>;

/// One row's change
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    Inserted(Row),
    Modified { old: Row, new: Row },
    Deleted(Row),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    pub table: String,
    pub uuid: Uuid,
    pub change: RowChange,
}

/// Changes to one table, rows in payload order
#[derive(Debug, Clone, PartialEq)]
pub struct TableUpdate {
    pub name: String,
    pub rows: Vec<RowUpdate>,
}

/// A decoded `<table-updates>` object, tables in payload order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableUpdates {
    pub tables: Vec<TableUpdate>,
}

impl TableUpdates {
    pub fn from_wire(json: &Json) -> Result<Self> {
        let tables = json
            .as_object()
            .ok_or_else(|| OvsdbError::malformed(format!("table-updates is not an object: {}", json)))?;

        let tables = tables
            .iter()
            .map(|(name, rows)| decode_table(name, rows))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { tables })
    }

    /// Flatten into row updates, table then row order
    pub fn row_updates(&self) -> Vec<RowUpdate> {
        self.tables
            .iter()
            .flat_map(|table| table.rows.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|table| table.rows.is_empty())
    }
}

fn decode_table(name: &str, json: &Json) -> Result<TableUpdate> {
    let rows = json.as_object().ok_or_else(|| {
        OvsdbError::malformed(format!("table-update for {} is not an object", name))
    })?;

    let rows = rows
        .iter()
        .map(|(uuid, row)| decode_row(name, uuid, row))
        .collect::<Result<Vec<_>>>()?;
    Ok(TableUpdate {
        name: name.to_string(),
        rows,
    })
}

fn decode_row(table: &str, uuid: &str, json: &Json) -> Result<RowUpdate> {
    let uuid = Uuid::parse_str(uuid)
        .map_err(|e| OvsdbError::malformed(format!("row uuid {:?} in {}: {}", uuid, table, e)))?;
    let members = json
        .as_object()
        .ok_or_else(|| OvsdbError::malformed(format!("row-update {} is not an object", uuid)))?;

    let old = members.get("old").map(Row::from_wire).transpose()?;
    let new = members.get("new").map(Row::from_wire).transpose()?;

    let change = match (old, new) {
        (None, Some(new)) => RowChange::Inserted(new),
        (Some(old), Some(new)) => RowChange::Modified { old, new },
        (Some(old), None) => RowChange::Deleted(old),
        (None, None) => {
            return Err(OvsdbError::malformed(format!(
                "row-update {} in {} has neither old nor new",
                uuid, table
            )))
        }
    };

    Ok(RowUpdate {
        table: table.to_string(),
        uuid,
        change,
    })
}

/// What a subscription's callback receives
#[derive(Debug)]
pub enum MonitorEvent {
    Update(Vec<RowUpdate>),
    /// An `update` for this monitor could not be decoded; the monitor stays
    /// registered
    Malformed(OvsdbError),
    /// The connection is gone. Always the last event.
    Closed(OvsdbError),
}

/// Subscription callback. Runs on the subscription's own task.
pub trait MonitorCallback: Send + Sync + 'static {
    fn on_event(&self, event: MonitorEvent);
}

impl<F> MonitorCallback for F
where
    F: Fn(MonitorEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: MonitorEvent) {
        self(event)
    }
}

enum Slot {
    /// `monitor` sent, reply not yet seen
    Pending { buffered: Vec<Json> },
    Active(mpsc::UnboundedSender<MonitorEvent>),
}

/// Routes `update` notifications to subscriptions
#[derive(Default)]
pub struct MonitorDispatcher {
    slots: Mutex<HashMap<MonitorId, Slot>>,
}

impl MonitorDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<MonitorId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ids of registered monitors, including ones still awaiting their reply
    pub fn monitor_ids(&self) -> Vec<MonitorId> {
        let mut ids: Vec<_> = self.slots().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Start monitoring `database`.
    ///
    /// Returns the initial contents, which are also the first event the
    /// callback sees.
    pub async fn subscribe(
        &self,
        rpc: &JsonRpcClient,
        database: &str,
        id: MonitorId,
        requests: &MonitorRequests,
        callback: Arc<dyn MonitorCallback>,
    ) -> Result<TableUpdates> {
        {
            let mut slots = self.slots();
            if slots.contains_key(&id) {
                return Err(OvsdbError::DuplicateMonitor(id.to_string()));
            }
            slots.insert(id.clone(), Slot::Pending { buffered: Vec::new() });
        }
        // Still `Pending` when dropped means we bailed out early.
        let _provisional = ProvisionalSlot {
            dispatcher: self,
            id: &id,
        };

        let params = json!([database, id.as_str(), requests]);
        let reply = rpc.request("monitor", params).await?;
        let initial = match TableUpdates::from_wire(&reply) {
            Ok(initial) => initial,
            Err(e) => {
                // The server-side monitor is live even though we cannot use it.
                warn!("Initial contents of monitor {} are malformed: {}", id, e);
                if let Err(cancel) = rpc.request("monitor_cancel", json!([id.as_str()])).await {
                    warn!("monitor_cancel for {} failed: {}", id, cancel);
                }
                return Err(e);
            }
        };

        let (events, receiver) = mpsc::unbounded_channel();
        {
            let mut slots = self.slots();
            let buffered = match slots.remove(&id) {
                Some(Slot::Pending { buffered }) => buffered,
                Some(active) => {
                    slots.insert(id.clone(), active);
                    return Err(OvsdbError::DuplicateMonitor(id.to_string()));
                }
                None => {
                    return Err(JsonRpcError::closed(format!(
                        "connection closed while monitor {} was starting",
                        id
                    ))
                    .into())
                }
            };

            let _ = events.send(MonitorEvent::Update(initial.row_updates()));
            for update in &buffered {
                let _ = events.send(decode_update(update));
            }
            slots.insert(id.clone(), Slot::Active(events));
        }

        tokio::spawn(deliver(id.clone(), receiver, callback));
        info!("Monitor {} active on {}", id, database);
        Ok(initial)
    }

    /// Stop a monitor. The local entry goes first, so no further events are
    /// delivered whatever the server answers.
    pub async fn cancel(&self, rpc: &JsonRpcClient, id: &MonitorId) -> Result<()> {
        if self.slots().remove(id).is_none() {
            warn!("Cancelling unknown monitor {}", id);
        }

        match rpc.request("monitor_cancel", json!([id.as_str()])).await {
            Ok(_) => {
                debug!("Monitor {} cancelled", id);
                Ok(())
            }
            Err(e) => {
                warn!("monitor_cancel for {} failed: {}", id, e);
                Err(e.into())
            }
        }
    }

    fn route_update(&self, params: Json) {
        let Some([raw_id, updates]) = params.as_array().map(Vec::as_slice) else {
            warn!("Dropping update with malformed params: {}", params);
            return;
        };
        let Some(id) = raw_id.as_str().map(MonitorId::from) else {
            warn!("Dropping update for non-string monitor id {}", raw_id);
            return;
        };

        let mut slots = self.slots();
        match slots.get_mut(&id) {
            Some(Slot::Pending { buffered }) => {
                debug!("Buffering update for starting monitor {}", id);
                buffered.push(updates.clone());
            }
            Some(Slot::Active(events)) => {
                if events.send(decode_update(updates)).is_err() {
                    debug!("Delivery task for monitor {} has stopped", id);
                }
            }
            None => debug!("Dropping update for unknown monitor {}", id),
        }
    }
}

impl NotificationHandler for MonitorDispatcher {
    fn handle_notification(&self, method: &str, params: Json) {
        match method {
            "update" => self.route_update(params),
            other => warn!("Ignoring notification: {}", other),
        }
    }

    fn connection_closed(&self, error: &JsonRpcError) {
        let slots = std::mem::take(&mut *self.slots());
        let mut closed = 0;
        for (id, slot) in slots {
            if let Slot::Active(events) = slot {
                if events
                    .send(MonitorEvent::Closed(OvsdbError::Rpc(error.clone())))
                    .is_err()
                {
                    debug!("Delivery task for monitor {} has stopped", id);
                }
                closed += 1;
            }
        }
        if closed > 0 {
            info!("Closed {} monitor(s): {}", closed, error);
        }
    }
}

/// Drops the provisional registration if `subscribe` bails out early
struct ProvisionalSlot<'a> {
    dispatcher: &'a MonitorDispatcher,
    id: &'a MonitorId,
}

impl Drop for ProvisionalSlot<'_> {
    fn drop(&mut self) {
        let mut slots = self.dispatcher.slots();
        if matches!(slots.get(self.id), Some(Slot::Pending { .. })) {
            slots.remove(self.id);
        }
    }
}

fn decode_update(updates: &Json) -> MonitorEvent {
    match TableUpdates::from_wire(updates) {
        Ok(updates) => MonitorEvent::Update(updates.row_updates()),
        Err(e) => {
            warn!("Malformed update: {}", e);
            MonitorEvent::Malformed(e)
        }
    }
}

async fn deliver(
    id: MonitorId,
    mut events: mpsc::UnboundedReceiver<MonitorEvent>,
    callback: Arc<dyn MonitorCallback>,
) {
    while let Some(event) = events.recv().await {
        callback.on_event(event);
    }
    debug!("Delivery for monitor {} finished", id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_changes_from_old_and_new() {
        let raw = json!({
            "Bridge": {
                "00000000-0000-0000-0000-000000000001": {"new": {"name": "br0"}},
                "00000000-0000-0000-0000-000000000002": {"old": {"name": "a"}, "new": {"name": "b"}},
                "00000000-0000-0000-0000-000000000003": {"old": {"name": "gone"}}
            }
        });
        let updates = TableUpdates::from_wire(&raw).unwrap().row_updates();

        assert!(matches!(updates[0].change, RowChange::Inserted(_)));
        assert!(matches!(updates[1].change, RowChange::Modified { .. }));
        assert!(matches!(updates[2].change, RowChange::Deleted(_)));
        assert_eq!(updates[2].uuid, Uuid::from_u128(3));
    }

    #[test]
    fn test_payload_order_is_kept() {
        let raw: Json = serde_json::from_str(
            r#"{
                "Port": {
                    "00000000-0000-0000-0000-00000000000b": {"new": {}},
                    "00000000-0000-0000-0000-00000000000a": {"new": {}}
                },
                "Bridge": {
                    "00000000-0000-0000-0000-000000000001": {"new": {}}
                }
            }"#,
        )
        .unwrap();

        let order: Vec<(String, Uuid)> = TableUpdates::from_wire(&raw)
            .unwrap()
            .row_updates()
            .into_iter()
            .map(|u| (u.table, u.uuid))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Port".to_string(), Uuid::from_u128(0xb)),
                ("Port".to_string(), Uuid::from_u128(0xa)),
                ("Bridge".to_string(), Uuid::from_u128(1)),
            ]
        );
    }

    #[test]
    fn test_row_update_needs_old_or_new() {
        let raw = json!({"Bridge": {"00000000-0000-0000-0000-000000000001": {}}});
        assert!(TableUpdates::from_wire(&raw).is_err());

        let raw = json!({"Bridge": {"not-a-uuid": {"new": {}}}});
        assert!(TableUpdates::from_wire(&raw).is_err());
    }

    #[test]
    fn test_monitor_request_encoding() {
        let mut requests = MonitorRequests::new();
        requests.insert("Bridge".to_string(), MonitorRequest::columns(["name", "ports"]));
        requests.insert(
            "Port".to_string(),
            MonitorRequest::all().with_select(MonitorSelect {
                initial: false,
                ..MonitorSelect::default()
            }),
        );

        assert_eq!(
            serde_json::to_value(&requests).unwrap(),
            json!({
                "Bridge": {"columns": ["name", "ports"]},
                "Port": {"select": {"initial": false, "insert": true, "delete": true, "modify": true}}
            })
        );
    }

    #[test]
    fn test_updates_for_unknown_monitor_are_dropped() {
        let dispatcher = MonitorDispatcher::new();
        dispatcher.handle_notification("update", json!(["nobody", {}]));
        dispatcher.handle_notification("update", json!("garbage"));
        assert!(dispatcher.monitor_ids().is_empty());
    }

    #[test]
    fn test_closed_only_reaches_active_monitors() {
        let dispatcher = MonitorDispatcher::new();
        let (events, mut receiver) = mpsc::unbounded_channel();
        dispatcher
            .slots()
            .insert(MonitorId::from("live"), Slot::Active(events));
        dispatcher.slots().insert(
            MonitorId::from("starting"),
            Slot::Pending {
                buffered: Vec::new(),
            },
        );

        dispatcher.connection_closed(&JsonRpcError::closed("eof"));
        dispatcher.connection_closed(&JsonRpcError::closed("eof"));

        assert!(matches!(receiver.try_recv(), Ok(MonitorEvent::Closed(_))));
        assert!(receiver.try_recv().is_err());
        assert!(dispatcher.monitor_ids().is_empty());
    }
}
