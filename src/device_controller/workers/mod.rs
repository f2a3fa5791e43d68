pub mod heartbeating_worker;
