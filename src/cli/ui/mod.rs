mod device_view;
mod painter;
mod session_view;
mod table;

pub(crate) use self::device_view::DeviceView;
pub(crate) use self::painter::Painter;
pub(crate) use self::session_view::{
    CommandFailureView, NotificationView, ReceiptView, SessionReadyView, SessionSummaryView,
};
