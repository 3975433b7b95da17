//! Utility meter: an unlimited supplier at a fixed price.

use std::collections::BTreeMap;

use crate::error::SimError;
use crate::sim::message::MessageKind;
use crate::sim::types::DeviceId;

use super::core::DeviceCore;
use super::types::{Context, DeviceBehavior};

#[derive(Debug, Clone)]
pub struct UtilityMeter {
    price: f64,
    flows: BTreeMap<DeviceId, f64>,
}

impl UtilityMeter {
    pub fn new(price: f64) -> Self {
        Self {
            price,
            flows: BTreeMap::new(),
        }
    }

    pub fn price(&self) -> f64 {
        self.price
    }
}

impl DeviceBehavior for UtilityMeter {
    fn device_type(&self) -> &'static str {
        "utility_meter"
    }

    /// Books the level a peer now draws as outbound flow.
    fn process_power_message(
        &mut self,
        core: &mut DeviceCore,
        _ctx: &mut Context<'_>,
        sender: &DeviceId,
        value: f64,
    ) -> Result<(), SimError> {
        let flow = -value;
        let previous = self.flows.get(sender).copied().unwrap_or(0.0);
        core.recalc_power(previous, flow)?;
        self.flows.insert(sender.clone(), flow);
        core.log("power", format!("supplying {sender}"), Some(value));
        Ok(())
    }

    fn process_price_message(
        &mut self,
        core: &mut DeviceCore,
        _ctx: &mut Context<'_>,
        sender: &DeviceId,
        price: f64,
    ) -> Result<(), SimError> {
        core.log("price", format!("ignored price from {sender}"), Some(price));
        Ok(())
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

    fn on_peer_registered(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        peer: &DeviceId,
    ) -> Result<(), SimError> {
        core.send_message(ctx, peer, MessageKind::Price, self.price)
    }
}
