use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, PeripheralProperties,
    ScanFilter, Service, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, info, instrument, trace};

use super::hardware::{ConnectedBleSession, NotificationFeed, WriteMode};
use super::model::FoundDevice;
use crate::error::InteractionError;
use crate::protocol::{self, EndpointId};

/// Hardware backend backed by `btleplug`.
#[derive(Debug)]
pub(crate) struct BtleplugBackend {
    manager: Manager,
    discovered: Mutex<HashMap<String, Peripheral>>,
}

impl BtleplugBackend {
    /// Creates the real BLE backend.
    pub(crate) async fn new() -> Result<Self, InteractionError> {
        let manager = Manager::new().await?;
        Ok(Self {
            manager,
            discovered: Mutex::new(HashMap::new()),
        })
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapters(&self) -> Result<Vec<AdapterHandle>, InteractionError> {
        let adapters = self.manager.adapters().await.map_err(scan_error)?;
        if adapters.is_empty() {
            return Err(InteractionError::NoAdapters);
        }

        let mut handles = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let name = adapter.adapter_info().await.map_err(scan_error)?;
            handles.push(AdapterHandle { adapter, name });
        }
        Ok(handles)
    }

    /// Scans every adapter for the full window and reports what was seen.
    #[instrument(skip(self), level = "debug", fields(?window))]
    pub(crate) async fn scan(&self, window: Duration) -> Result<Vec<FoundDevice>, InteractionError> {
        let adapters = self.adapters().await?;
        info!(adapter_count = adapters.len(), "starting bounded BLE scan");

        let mut events = StreamMap::new();
        for (index, handle) in adapters.iter().enumerate() {
            let stream = handle.adapter.events().await.map_err(scan_error)?;
            events.insert(index, stream);
            handle
                .adapter
                .start_scan(ScanFilter::default())
                .await
                .map_err(scan_error)?;
        }

        let mut seen = HashSet::new();
        let mut discovery_order: Vec<(usize, PeripheralId)> = Vec::new();
        let deadline = sleep(window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => break,
                Some((index, event)) = events.next() => {
                    if let CentralEvent::DeviceDiscovered(id) = event
                        && seen.insert((index, id.clone()))
                    {
                        trace!(adapter = index, peripheral = %id, "peripheral discovered");
                        discovery_order.push((index, id));
                    }
                }
            }
        }

        for handle in &adapters {
            if let Err(error) = handle.adapter.stop_scan().await {
                debug!(?error, adapter = %handle.name, "failed to stop adapter scan cleanly");
            }
        }

        let mut ordered: Vec<(usize, Peripheral)> = Vec::new();
        for (index, id) in &discovery_order {
            match adapters[*index].adapter.peripheral(id).await {
                Ok(peripheral) => ordered.push((*index, peripheral)),
                Err(error) => trace!(?error, peripheral = %id, "discovered peripheral vanished"),
            }
        }
        for (index, handle) in adapters.iter().enumerate() {
            let mut known = handle.adapter.peripherals().await.map_err(scan_error)?;
            known.sort_by_key(|peripheral| peripheral.id().to_string());
            ordered.extend(
                known
                    .into_iter()
                    .filter(|peripheral| !seen.contains(&(index, peripheral.id())))
                    .map(|peripheral| (index, peripheral)),
            );
        }

        let mut observed = Vec::with_capacity(ordered.len());
        let mut discovered = HashMap::with_capacity(ordered.len());
        for (index, peripheral) in ordered {
            let Some(properties) = peripheral.properties().await.map_err(scan_error)? else {
                continue;
            };
            let device_id = peripheral.id().to_string();
            if discovered.contains_key(&device_id) {
                continue;
            }
            observed.push(found_device_from_properties(
                &adapters[index].name,
                device_id.clone(),
                &properties,
            ));
            discovered.insert(device_id, peripheral);
        }

        debug!(observed = observed.len(), "scan window closed");
        *self.discovered.lock() = discovered;
        Ok(observed)
    }

    /// Connects to a device from the last scan and resolves the robot endpoints.
    #[instrument(skip(self, device), level = "info", fields(device_id = device.device_id(), progress = true))]
    pub(crate) async fn connect(
        &self,
        device: &FoundDevice,
    ) -> Result<RealDeviceSession, InteractionError> {
        let peripheral = self
            .discovered
            .lock()
            .get(device.device_id())
            .cloned()
            .ok_or_else(|| InteractionError::UnknownDevice {
                device_id: device.device_id().to_string(),
            })?;
        let connect_error = |source| InteractionError::Connect {
            device_id: device.device_id().to_string(),
            source,
        };

        if !peripheral.is_connected().await.map_err(connect_error)? {
            peripheral.connect().await.map_err(connect_error)?;
        }
        let discovered = peripheral.discover_services().await.map_err(connect_error);
        release_on_error(discovered, peripheral.disconnect()).await?;

        let services = peripheral.services();
        let characteristics_by_endpoint = resolve_characteristics(&services);
        let missing = missing_required_endpoints(
            has_robot_service(&services),
            &characteristics_by_endpoint,
        );
        let validated = if missing.is_empty() {
            Ok(())
        } else {
            Err(InteractionError::MissingRequiredEndpoints {
                missing: format_missing_endpoints(&missing),
            })
        };
        release_on_error(validated, peripheral.disconnect()).await?;

        info!("connected to Braava robot");
        Ok(RealDeviceSession {
            device: device.clone(),
            peripheral,
            characteristics_by_endpoint,
            forwarders: Mutex::new(Vec::new()),
        })
    }
}

/// Awaits `release` when `result` failed, then returns `result` unchanged.
///
/// A failing release is logged; the original error is the one reported.
async fn release_on_error<T, F>(
    result: Result<T, InteractionError>,
    release: F,
) -> Result<T, InteractionError>
where
    F: Future<Output = Result<(), btleplug::Error>>,
{
    if let Err(error) = &result {
        debug!(%error, "releasing link after failed connect");
        if let Err(release_error) = release.await {
            debug!(?release_error, "failed to disconnect after connect error");
        }
    }
    result
}

fn scan_error(source: btleplug::Error) -> InteractionError {
    InteractionError::Scan { source }
}

fn found_device_from_properties(
    adapter_name: &str,
    device_id: String,
    properties: &PeripheralProperties,
) -> FoundDevice {
    let service_uuids = properties
        .services
        .iter()
        .map(|uuid| uuid.to_string().to_lowercase())
        .collect();

    FoundDevice::new(
        adapter_name.to_string(),
        device_id,
        properties.local_name.clone(),
        properties.rssi,
    )
    .with_service_uuids(service_uuids)
}

fn has_robot_service(services: &BTreeSet<Service>) -> bool {
    let robot_service = protocol::endpoint_metadata(EndpointId::RobotService).uuid();
    services
        .iter()
        .any(|service| service.uuid.to_string().eq_ignore_ascii_case(robot_service))
}

fn resolve_characteristics(services: &BTreeSet<Service>) -> HashMap<EndpointId, Characteristic> {
    services
        .iter()
        .flat_map(|service| service.characteristics.iter())
        .filter_map(|characteristic| {
            protocol::endpoint_for_uuid(&characteristic.uuid.to_string())
                .map(|endpoint| (endpoint, characteristic.clone()))
        })
        .collect()
}

fn missing_required_endpoints<T>(
    service_present: bool,
    characteristics_by_endpoint: &HashMap<EndpointId, T>,
) -> Vec<EndpointId> {
    let mut missing = Vec::new();
    if !service_present {
        missing.push(EndpointId::RobotService);
    }
    missing.extend(protocol::characteristic_endpoints().filter(|endpoint| {
        protocol::endpoint_metadata(*endpoint).required()
            && !characteristics_by_endpoint.contains_key(endpoint)
    }));
    missing
}

fn format_missing_endpoints(endpoints: &[EndpointId]) -> String {
    endpoints
        .iter()
        .map(|endpoint| {
            let metadata = protocol::endpoint_metadata(*endpoint);
            format!("{} ({})", metadata.name(), metadata.uuid())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_type_for(mode: WriteMode) -> WriteType {
    match mode {
        WriteMode::WithResponse => WriteType::WithResponse,
        WriteMode::WithoutResponse => WriteType::WithoutResponse,
    }
}

#[derive(Debug)]
struct AdapterHandle {
    adapter: Adapter,
    name: String,
}

/// Active session bound to a real peripheral.
#[derive(Debug)]
pub(crate) struct RealDeviceSession {
    device: FoundDevice,
    peripheral: Peripheral,
    characteristics_by_endpoint: HashMap<EndpointId, Characteristic>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
}

impl RealDeviceSession {
    fn characteristic_for(
        &self,
        endpoint: EndpointId,
    ) -> Result<&Characteristic, InteractionError> {
        self.characteristics_by_endpoint
            .get(&endpoint)
            .ok_or(InteractionError::MissingEndpoint { endpoint })
    }
}

#[async_trait]
impl ConnectedBleSession for RealDeviceSession {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    async fn write_endpoint(
        &self,
        endpoint: EndpointId,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        let characteristic = self.characteristic_for(endpoint)?;
        self.peripheral
            .write(characteristic, payload, write_type_for(mode))
            .await?;
        Ok(())
    }

    async fn subscribe_endpoint(
        &self,
        endpoint: EndpointId,
    ) -> Result<NotificationFeed, InteractionError> {
        let characteristic = self.characteristic_for(endpoint)?.clone();
        let mut notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&characteristic).await?;

        let (sender, feed) = mpsc::unbounded_channel();
        let expected_uuid = characteristic.uuid;
        let forwarder = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != expected_uuid {
                    continue;
                }
                if sender.send(notification.value).is_err() {
                    break;
                }
            }
            trace!("notification forwarder finished");
        });
        self.forwarders.lock().push(forwarder);

        Ok(feed)
    }

    async fn close(self: Box<Self>) -> Result<(), InteractionError> {
        for forwarder in self.forwarders.lock().drain(..) {
            forwarder.abort();
        }
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use btleplug::api::bleuuid::uuid_from_u16;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn resolved(endpoints: &[EndpointId]) -> HashMap<EndpointId, ()> {
        endpoints.iter().map(|endpoint| (*endpoint, ())).collect()
    }

    #[rstest]
    #[case::complete(
        true,
        &[
            EndpointId::ControlCharacteristic,
            EndpointId::PayloadCharacteristic,
            EndpointId::NotifyCharacteristic,
        ],
        &[]
    )]
    #[case::read_characteristic_not_required(
        true,
        &[
            EndpointId::ControlCharacteristic,
            EndpointId::PayloadCharacteristic,
            EndpointId::NotifyCharacteristic,
            EndpointId::ReadCharacteristic,
        ],
        &[]
    )]
    #[case::missing_payload(
        true,
        &[EndpointId::ControlCharacteristic, EndpointId::NotifyCharacteristic],
        &[EndpointId::PayloadCharacteristic]
    )]
    #[case::missing_service(
        false,
        &[
            EndpointId::ControlCharacteristic,
            EndpointId::PayloadCharacteristic,
            EndpointId::NotifyCharacteristic,
        ],
        &[EndpointId::RobotService]
    )]
    fn missing_required_endpoints_reports_gaps(
        #[case] service_present: bool,
        #[case] present: &[EndpointId],
        #[case] expected: &[EndpointId],
    ) {
        let missing = missing_required_endpoints(service_present, &resolved(present));
        assert_eq!(expected.to_vec(), missing);
    }

    #[test]
    fn format_missing_endpoints_lists_names_and_uuids() {
        let rendered = format_missing_endpoints(&[
            EndpointId::ControlCharacteristic,
            EndpointId::NotifyCharacteristic,
        ]);
        assert_eq!(
            "Braava command control (e7add780-b042-4876-aae1-112855353cc2), Braava status notify (e7add780-b042-4876-aae1-112855353cc4)",
            rendered
        );
    }

    #[tokio::test]
    async fn release_on_error_only_disconnects_failed_connects() {
        let releases = AtomicUsize::new(0);
        let counter = &releases;
        let release = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), btleplug::Error>(())
        };

        let kept = release_on_error(Ok::<_, InteractionError>(7), release()).await;
        assert_matches!(kept, Ok(7));
        assert_eq!(0, releases.load(Ordering::SeqCst));

        let failed = release_on_error::<(), _>(
            Err(InteractionError::Connect {
                device_id: "AA:BB:CC".to_string(),
                source: btleplug::Error::DeviceNotFound,
            }),
            release(),
        )
        .await;
        assert_matches!(failed, Err(InteractionError::Connect { device_id, .. }) if device_id == "AA:BB:CC");
        assert_eq!(1, releases.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn release_on_error_keeps_original_error_when_disconnect_fails() {
        let result = release_on_error::<(), _>(
            Err(InteractionError::MissingRequiredEndpoints {
                missing: "Braava command payload".to_string(),
            }),
            async { Err(btleplug::Error::NotConnected) },
        )
        .await;

        assert_matches!(result, Err(InteractionError::MissingRequiredEndpoints { .. }));
    }

    #[rstest]
    #[case(WriteMode::WithResponse, WriteType::WithResponse)]
    #[case(WriteMode::WithoutResponse, WriteType::WithoutResponse)]
    fn write_type_for_maps_modes(#[case] mode: WriteMode, #[case] expected: WriteType) {
        assert_eq!(expected, write_type_for(mode));
    }

    #[test]
    fn found_device_from_properties_lowercases_services() {
        let properties = PeripheralProperties {
            local_name: Some("Altadena".to_string()),
            rssi: Some(-58),
            services: vec![uuid_from_u16(0x180F)],
            ..PeripheralProperties::default()
        };

        let device = found_device_from_properties("hci0", "AA:BB:CC".to_string(), &properties);

        assert_eq!("hci0", device.adapter_name());
        assert_eq!(Some("Altadena"), device.local_name());
        assert_eq!(Some(-58), device.rssi());
        assert_eq!(
            vec!["0000180f-0000-1000-8000-00805f9b34fb".to_string()],
            device.service_uuids().to_vec()
        );
    }
}
