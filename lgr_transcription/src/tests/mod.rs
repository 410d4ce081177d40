mod config;
mod interpolation;
mod mesh_refinement;
mod phase;
mod radau;
mod radau_math;
mod user_functions;
