pub mod composite;
pub mod concentration;
pub mod constants;
pub mod cross_section;
pub mod eloss;
pub mod error;
pub mod events;
pub mod fields;
pub mod gsto;
pub mod interp;
pub mod kinematics;
pub mod masses;
pub mod profile;
pub mod reconstruct;
pub mod setup;

pub use composite::{CompositeStopping, ElementStopping};
pub use concentration::ConcentrationProfile;
pub use cross_section::{CrossSectionModel, ScreeningModel};
pub use eloss::{StoppingLookup, energy_loss};
pub use error::{Result, TofDepthError};
pub use events::{Event, EventCensus, load_events, read_events};
pub use gsto::{SourceDescriptor, StoppingSource, StoppingTable};
pub use kinematics::EventKind;
pub use masses::{Isotope, IsotopeTable};
pub use profile::{DepthProfile, DepthUnit, OutputProfile};
pub use reconstruct::{Placement, Reconstructor, Stage};
pub use setup::{Beam, DepthSetup};
pub use tofdepth_data;
