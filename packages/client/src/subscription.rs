//! Subscription bookkeeping for one broker connection.
//!
//! The registry hands out STOMP subscription ids, remembers which inbound
//! route each id belongs to, and keeps the group set equal to the most
//! recent request.

use std::collections::{BTreeMap, HashMap};

use crate::{
    destination,
    error::ClientError,
    stomp::Frame,
    types::{GroupId, UserId},
};

/// Outbound side of a connection, as seen by the registry
#[cfg_attr(test, mockall::automock)]
pub trait FrameSink {
    fn send_frame(&self, frame: Frame) -> Result<(), ClientError>;
}

/// Where an inbound MESSAGE frame is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Messages,
    Typing,
    Group(GroupId),
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    next_id: u64,
    routes: HashMap<String, Route>,
    groups: BTreeMap<GroupId, String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe the user's personal message and typing queues.
    pub fn subscribe_personal(
        &mut self,
        sink: &dyn FrameSink,
        user_id: UserId,
    ) -> Result<(), ClientError> {
        self.subscribe(sink, Route::Messages, &destination::user_messages(user_id))?;
        self.subscribe(sink, Route::Typing, &destination::user_typing(user_id))?;
        Ok(())
    }

    /// Replace the whole group set with `group_ids`.
    ///
    /// Every active group subscription is unsubscribed first. Unsubscribe
    /// failures are logged and do not stop the new subscriptions. The group
    /// set reflects the request even when a subscribe fails; the first such
    /// failure is returned.
    pub fn replace_groups(
        &mut self,
        sink: &dyn FrameSink,
        group_ids: &[GroupId],
    ) -> Result<(), ClientError> {
        for (group_id, sub_id) in std::mem::take(&mut self.groups) {
            self.routes.remove(&sub_id);
            if let Err(e) = sink.send_frame(Frame::unsubscribe(&sub_id)) {
                tracing::warn!("Failed to unsubscribe from group {}: {}", group_id, e);
            }
        }

        let mut first_error = None;
        for &group_id in group_ids {
            if self.groups.contains_key(&group_id) {
                continue;
            }
            let sub_id = self.allocate(Route::Group(group_id));
            self.groups.insert(group_id, sub_id.clone());
            let frame = Frame::subscribe(&sub_id, &destination::group_topic(group_id));
            if let Err(e) = sink.send_frame(frame) {
                tracing::warn!("Failed to subscribe to group {}: {}", group_id, e);
                first_error.get_or_insert(e);
            }
        }

        tracing::debug!("Group subscriptions now {:?}", self.group_ids());
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Route of an inbound frame's `subscription` header.
    pub fn route(&self, subscription_id: &str) -> Option<Route> {
        self.routes.get(subscription_id).copied()
    }

    /// Currently subscribed group ids, ascending.
    pub fn group_ids(&self) -> Vec<GroupId> {
        self.groups.keys().copied().collect()
    }

    /// Forget every subscription. Used when the connection goes away, since
    /// the broker drops subscriptions together with the session.
    pub fn clear(&mut self) {
        self.routes.clear();
        self.groups.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.routes.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn subscribe(
        &mut self,
        sink: &dyn FrameSink,
        route: Route,
        destination: &str,
    ) -> Result<(), ClientError> {
        let sub_id = self.allocate(route);
        sink.send_frame(Frame::subscribe(&sub_id, destination))
    }

    fn allocate(&mut self, route: Route) -> String {
        let sub_id = format!("sub-{}", self.next_id);
        self.next_id += 1;
        self.routes.insert(sub_id.clone(), route);
        sub_id
    }
}
