pub mod halo_loop;

pub use halo_loop::HaloLoop;
