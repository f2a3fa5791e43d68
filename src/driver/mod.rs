pub mod xap;
