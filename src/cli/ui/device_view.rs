use std::fmt::{self, Display, Formatter};

use crate::hw::FoundDevice;
use crate::utils::{format_rssi, format_service_uuids};

use super::painter::Painter;
use super::table::FieldTable;

/// Identity and signal of a discovered robot.
pub(crate) struct DeviceView<'a> {
    device: &'a FoundDevice,
    painter: &'a Painter,
}

impl<'a> DeviceView<'a> {
    pub(crate) fn new(device: &'a FoundDevice, painter: &'a Painter) -> Self {
        Self { device, painter }
    }
}

impl Display for DeviceView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self { device, painter } = *self;
        let table = FieldTable::new(painter)
            .row("adapter", painter.value(device.adapter_name()))
            .row("device_id", painter.value(device.device_id()))
            .row("name", painter.value(device.local_name().unwrap_or("<unknown>")))
            .row("rssi", painter.value(format_rssi(device.rssi())))
            .row("services", painter.muted(format_service_uuids(device.service_uuids())));
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn device_view_renders_all_fields() {
        let device = FoundDevice::new(
            "hci0".into(),
            "AA:BB:CC".into(),
            Some("Altadena".into()),
            Some(-43),
        );
        let painter = Painter::new(false);

        assert_snapshot!(DeviceView::new(&device, &painter).to_string(), @r"
        ╭───────────┬──────────╮
        │ field     │ value    │
        ├───────────┼──────────┤
        │ adapter   │ hci0     │
        │ device_id │ AA:BB:CC │
        │ name      │ Altadena │
        │ rssi      │ -43      │
        │ services  │ -        │
        ╰───────────┴──────────╯
        ");
    }

    #[test]
    fn device_view_marks_missing_name() {
        let device = FoundDevice::new("hci0".into(), "AA:BB:CC".into(), None, None);
        let painter = Painter::new(false);

        let rendered = DeviceView::new(&device, &painter).to_string();
        assert!(rendered.contains("<unknown>"));
    }
}
