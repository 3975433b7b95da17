//! Grid controller: routes power from a supplier to its consumers.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::SimError;
use crate::sim::message::MessageKind;
use crate::sim::types::{DeviceId, EUD_PREFIX, UTILITY_METER_PREFIX};

use super::core::DeviceCore;
use super::types::{Context, DeviceBehavior};

/// Brokers power between an upstream utility meter and end-use devices.
///
/// Each link's flow is kept from the controller's side: positive when power
/// comes in over that link. Whenever a consumer changes what it draws, the
/// controller asks its supplier for the total its consumers now need.
#[derive(Debug, Clone)]
pub struct GridController {
    price: f64,
    loads: BTreeMap<DeviceId, f64>,
}

impl GridController {
    pub fn new(price: f64) -> Self {
        Self {
            price,
            loads: BTreeMap::new(),
        }
    }

    /// Price currently broadcast to consumers.
    pub fn price(&self) -> f64 {
        self.price
    }

    /// Signed flow on the link to `peer`.
    pub fn load(&self, peer: &DeviceId) -> f64 {
        self.loads.get(peer).copied().unwrap_or(0.0)
    }

    fn set_load(
        &mut self,
        core: &mut DeviceCore,
        peer: &DeviceId,
        flow: f64,
    ) -> Result<(), SimError> {
        let previous = self.load(peer);
        core.recalc_power(previous, flow)?;
        self.loads.insert(peer.clone(), flow);
        Ok(())
    }

    /// Sum drawn by every non-supplier peer.
    fn consumer_demand(&self) -> f64 {
        self.loads
            .iter()
            .filter(|(peer, _)| !peer.has_prefix(UTILITY_METER_PREFIX))
            .map(|(_, flow)| -flow)
            .sum::<f64>()
            .max(0.0)
    }

    fn rebalance(&mut self, core: &mut DeviceCore, ctx: &mut Context<'_>) -> Result<(), SimError> {
        let demand = self.consumer_demand();
        let Some(supplier) = core.connected_with_prefix(UTILITY_METER_PREFIX).next().cloned() else {
            debug!(device = %core.id(), demand, "no supplier connected");
            core.log("balance", "no supplier for demand", Some(demand));
            return Ok(());
        };
        if self.load(&supplier) == demand {
            return Ok(());
        }
        self.set_load(core, &supplier, demand)?;
        core.send_message(ctx, &supplier, MessageKind::Power, demand)
    }

    fn broadcast_price(&self, core: &DeviceCore, ctx: &mut Context<'_>) -> Result<(), SimError> {
        let consumers: Vec<DeviceId> = core.connected_with_prefix(EUD_PREFIX).cloned().collect();
        for eud in &consumers {
            core.send_message(ctx, eud, MessageKind::Price, self.price)?;
        }
        Ok(())
    }
}

impl DeviceBehavior for GridController {
    fn device_type(&self) -> &'static str {
        "grid_controller"
    }

    fn process_power_message(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        sender: &DeviceId,
        value: f64,
    ) -> Result<(), SimError> {
        self.set_load(core, sender, -value)?;
        if sender.has_prefix(UTILITY_METER_PREFIX) {
            return Ok(());
        }
        self.rebalance(core, ctx)
    }

    fn process_price_message(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        sender: &DeviceId,
        price: f64,
    ) -> Result<(), SimError> {
        if sender.has_prefix(EUD_PREFIX) {
            core.log("price", format!("ignored price from consumer {sender}"), Some(price));
            return Ok(());
        }
        self.price = price;
        core.log("price", format!("adopted price from {sender}"), Some(price));
        self.broadcast_price(core, ctx)
    }

    fn process_request_message(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        sender: &DeviceId,
        amount: f64,
    ) -> Result<(), SimError> {
        core.send_message(ctx, sender, MessageKind::Allocate, -amount)
    }

    fn process_allocate_message(
        &mut self,
        core: &mut DeviceCore,
        _ctx: &mut Context<'_>,
        sender: &DeviceId,
        amount: f64,
    ) -> Result<(), SimError> {
        core.log("allocate", format!("allocation from {sender}"), Some(amount));
        Ok(())
    }

    fn device_specific_calcs(&self, core: &DeviceCore) {
        core.log("price", "final price", Some(self.price));
    }

    fn on_peer_registered(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        peer: &DeviceId,
    ) -> Result<(), SimError> {
        if peer.has_prefix(EUD_PREFIX) {
            core.send_message(ctx, peer, MessageKind::Price, self.price)?;
        }
        Ok(())
    }
}
