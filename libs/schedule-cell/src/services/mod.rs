pub mod availability;
pub mod holiday;
pub mod reference;
pub mod reference_cache;
pub mod schedule;
pub mod slot_generator;
pub mod staff_assignment;

pub use availability::{AvailabilityService, BookingWindow};
pub use holiday::HolidayResolver;
pub use reference::ReferenceDataService;
pub use reference_cache::{Collection, ReferenceCache};
pub use schedule::ScheduleService;
pub use slot_generator::SlotGenerator;
pub use staff_assignment::StaffAssignmentService;
