use nalgebra::DVector;
use romulus::parallel::{Communicator, ExecutionContext, GlobalSection, SerialCommunicator};
use std::panic::{catch_unwind, AssertUnwindSafe};

#[test]
fn serial_context_is_root() {
    let context = ExecutionContext::serial();
    assert_eq!(context.partitions(), 1);
    assert_eq!(context.rank(), 0);
    assert!(context.is_root());
}

#[test]
fn nonzero_rank_is_not_root() {
    let context = ExecutionContext::new(4, 3);
    assert!(!context.is_root());
}

#[test]
#[should_panic(expected = "out of range")]
fn rank_must_be_within_partitions() {
    ExecutionContext::new(2, 2);
}

#[test]
fn serial_communicator_is_identity() {
    let comm = SerialCommunicator;
    assert_eq!(comm.sum_scalar(1.5), 1.5);

    let mut v = DVector::from_column_slice(&[1.0, 2.0]);
    comm.sum_vector(&mut v);
    assert_eq!(v, DVector::from_column_slice(&[1.0, 2.0]));

    assert_eq!(comm.concat_patch(&v), v);
    assert_eq!(comm.context(), ExecutionContext::serial());
}

#[test]
fn global_section_suspends_and_restores() {
    let mut context = ExecutionContext::new(8, 5);
    {
        let section = GlobalSection::enter(&mut context);
        assert_eq!(section.context(), ExecutionContext::serial());
    }
    assert_eq!(context, ExecutionContext::new(8, 5));
}

#[test]
fn global_section_restores_on_unwind() {
    let mut context = ExecutionContext::new(3, 1);
    let result = catch_unwind(AssertUnwindSafe(|| {
        let _section = GlobalSection::enter(&mut context);
        panic!("interrupted inside the section");
    }));
    assert!(result.is_err());
    assert_eq!(context, ExecutionContext::new(3, 1));
}

#[test]
fn nested_sections_unwind_in_order() {
    let mut context = ExecutionContext::new(4, 2);
    {
        let section = GlobalSection::enter(&mut context);
        assert_eq!(section.context().partitions(), 1);
    }
    {
        let _again = GlobalSection::enter(&mut context);
    }
    assert_eq!(context, ExecutionContext::new(4, 2));
}
