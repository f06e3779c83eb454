mod sharded_test;
