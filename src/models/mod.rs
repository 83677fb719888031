pub mod flow_record;
pub mod timeline;

pub use flow_record::{AppTransitionNotice, FlowRecord};
pub use timeline::{
    into_chronological, AppTransition, AttachedEvent, Screenshot, TimelineEvent, WindowEvent,
    WindowEventKind,
};
