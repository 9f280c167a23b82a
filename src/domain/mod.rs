// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits that name the core
// concepts of the system: an MNIST example, the stages a run
// goes through, and the seams the trainer talks to.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits

// One labelled MNIST example and the image constants
pub mod mnist_item;

// Run stages (fit / validate / test / predict) and step phases
pub mod stage;

// Core abstractions (traits) that other layers implement
pub mod traits;
