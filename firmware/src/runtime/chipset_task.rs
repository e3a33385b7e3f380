use chipset_core::power::StepOutcome;
use chipset_core::signals::SIGNAL_POLL_INTERVAL;
use embassy_futures::select::{Either, select};
use embassy_time::{Instant, Timer};

use super::{FirmwareEngine, REQUESTS};
use crate::instant::to_embassy;
use crate::status::{self, StatusSnapshot};

fn publish(engine: &FirmwareEngine) {
    status::publish(StatusSnapshot {
        info: engine.power_info(),
        debug_mask: engine.debug_mask(),
        s5_timeout: engine.s5_timeout(),
        pulse_enabled: engine.button().pulse_enabled(),
    });
}

#[embassy_executor::task]
pub async fn run(mut engine: FirmwareEngine) -> ! {
    let requests = REQUESTS.receiver();
    publish(&engine);

    loop {
        while let Ok(request) = requests.try_receive() {
            engine.handle_request(request);
        }

        let outcome = engine.step().await;
        publish(&engine);

        let StepOutcome::Idle { wake_at } = outcome else {
            continue;
        };

        // Inputs are polled, so never sleep past the next sample.
        let poll = Instant::now() + to_embassy(SIGNAL_POLL_INTERVAL);
        let deadline = wake_at.map_or(poll, |at| at.into_embassy().min(poll));
        if let Either::First(request) = select(requests.receive(), Timer::at(deadline)).await {
            engine.handle_request(request);
        }
    }
}
