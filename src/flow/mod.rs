pub mod aggregate;
pub mod config;
pub mod session;
pub mod view;

pub use aggregate::{build_aggregate_flow, AggregateFlow, AppNodeData, FlowStats};
pub use config::{AggregateLayout, Orientation};
pub use session::{build_session_flow, FocusNodeData, SessionFlow};
pub use view::{
    spawn_transition_listener, AggregateFlowView, FlowLoadState, FlowScope, FlowSnapshot,
    LoadOutcome, SessionFlowView, TransitionBus,
};
