pub mod ddw_steps;
