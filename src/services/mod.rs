//! Business logic services

pub mod alerts;
pub mod bookings;
pub mod broadcast;
pub mod clock;
pub mod crowd;
pub mod ledger;
pub mod lifecycle;
pub mod qr;
pub mod simulation;
pub mod slots;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Repository};

use self::{
    bookings::BookingWorkflow,
    broadcast::TempleBroadcaster,
    clock::{Clock, SystemClock},
    qr::{DataUrlQrEncoder, QrEncoder},
    simulation::SimulationService,
    slots::SlotService,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub slots: SlotService,
    pub bookings: BookingWorkflow,
    pub simulation: SimulationService,
    pub broadcaster: TempleBroadcaster,
}

impl Services {
    /// Create all services with the given repository, the system clock and the data URL QR encoder
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        Self::with_parts(
            repository,
            config,
            Arc::new(SystemClock),
            Arc::new(DataUrlQrEncoder),
        )
    }

    pub fn with_parts(
        repository: Repository,
        config: &AppConfig,
        clock: Arc<dyn Clock>,
        qr: Arc<dyn QrEncoder>,
    ) -> Self {
        let broadcaster = TempleBroadcaster::new(config.simulation.broadcast_capacity);
        Self {
            slots: SlotService::new(
                repository.clone(),
                clock.clone(),
                config.booking.max_ledger_attempts,
            ),
            bookings: BookingWorkflow::new(
                repository.clone(),
                qr,
                clock.clone(),
                broadcaster.clone(),
                config.booking.clone(),
            ),
            simulation: SimulationService::new(
                repository,
                broadcaster.clone(),
                clock,
                config.simulation.clone(),
            ),
            broadcaster,
        }
    }
}
