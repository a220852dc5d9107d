pub mod kolkata;
