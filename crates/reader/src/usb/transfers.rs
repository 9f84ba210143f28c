//! Sensor command/response exchange
//!
//! Every exchange has two phases: a HID SET_REPORT control transfer
//! carrying the command, then interrupt reads on endpoint 0x82 until the
//! full response has arrived. Either phase failing aborts the exchange and
//! no partial sample is returned.

use crate::usb::backend::SensorHandle;
use crate::usb::session::Session;
use protocol::commands::{
    CONTROL_REQUEST, CONTROL_REQUEST_TYPE, CONTROL_TIMEOUT, CONTROL_VALUE, MAX_READ_ATTEMPTS,
    READ_ENDPOINT, READ_TIMEOUT, SAMPLE_LEN,
};
use protocol::{Command, RawSample, SensorError, Stage};
use tracing::{debug, trace};

/// Send `command` to the sensor (phase 1)
pub fn send_command<H: SensorHandle>(handle: &H, command: Command) -> Result<(), SensorError> {
    let index = command.interface();
    let payload = command.payload();

    debug!(
        "Control transfer: request_type={:#x}, request={:#x}, value={:#x}, index={}, data={:02x?}",
        CONTROL_REQUEST_TYPE, CONTROL_REQUEST, CONTROL_VALUE, index, payload
    );

    let written = handle
        .write_control(
            CONTROL_REQUEST_TYPE,
            CONTROL_REQUEST,
            CONTROL_VALUE,
            index,
            payload,
            CONTROL_TIMEOUT,
        )
        .map_err(|error| SensorError::Protocol {
            stage: Stage::ControlTransfer(index),
            error,
        })?;

    if written != payload.len() {
        debug!("Control transfer wrote {} of {} bytes", written, payload.len());
    }
    Ok(())
}

/// Fill `buf` from the interrupt endpoint (phase 2)
///
/// Reads accumulate until `buf` is full. A read that returns no data counts
/// as an attempt; after `MAX_READ_ATTEMPTS` attempts without a full buffer
/// the exchange fails as a short read.
pub fn read_response<H: SensorHandle>(handle: &H, buf: &mut [u8]) -> Result<(), SensorError> {
    let expected = buf.len();
    let mut received = 0;
    let mut attempts = 0;

    while received < expected {
        if attempts == MAX_READ_ATTEMPTS {
            return Err(SensorError::ShortRead { expected, received });
        }
        attempts += 1;

        let n = handle
            .read_interrupt(READ_ENDPOINT, &mut buf[received..], READ_TIMEOUT)
            .map_err(|error| SensorError::Protocol {
                stage: Stage::InterruptTransfer,
                error,
            })?;

        trace!(
            "Interrupt read {}: {} bytes ({}/{})",
            attempts,
            n,
            received + n,
            expected
        );
        received += n;
    }

    Ok(())
}

/// Send `command` and collect the 8-byte response
pub fn query<H: SensorHandle>(handle: &H, command: Command) -> Result<RawSample, SensorError> {
    send_command(handle, command)?;

    let mut sample: RawSample = [0u8; SAMPLE_LEN];
    read_response(handle, &mut sample)?;

    debug!("Response: {:02x?}", sample);
    Ok(sample)
}

/// Read one temperature sample from a claimed session
///
/// The initialisation command goes out once, on the first read of the
/// session.
pub fn read_sample<H: SensorHandle>(session: &mut Session<H>) -> Result<RawSample, SensorError> {
    if !session.is_initialised() {
        send_command(session.handle(), Command::Initialise)?;
        session.mark_initialised();
        debug!("Initialised {}", session.identity());
    }

    query(session.handle(), Command::QueryTemperature)
}
