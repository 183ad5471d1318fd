pub mod engine;
pub mod states;

pub use engine::{CheckoutWizard, FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{
    FlowAction, FlowContext, FlowEvent, FlowState, TransitionOutcome, WizardVocabulary,
};
