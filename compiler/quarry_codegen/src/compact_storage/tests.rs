use cranelift_codegen::ir::types::{F64, I16, I32, I64, I8};
use pretty_assertions::assert_eq;

use super::CompactStorage;
use crate::test_helpers::{as_fn, jit};
use crate::types::{SqlType, Type, Value};

#[test]
fn layout_places_bitmap_before_columns() {
    let storage = CompactStorage::setup(&[
        Type::nullable(SqlType::Integer),
        Type::not_null(SqlType::BigInt),
        Type::nullable(SqlType::Varchar),
        Type::not_null(SqlType::SmallInt),
    ]);
    assert_eq!(storage.column_offset(0), 1);
    assert_eq!(storage.column_offset(1), 5);
    assert_eq!(storage.column_offset(2), 13);
    assert_eq!(storage.column_offset(3), 25);
    assert_eq!(storage.max_storage_size(), 27);
    assert!(storage.has_varlen());
}

#[test]
fn nine_nullable_columns_need_two_bitmap_bytes() {
    let types = vec![Type::nullable(SqlType::TinyInt); 9];
    let storage = CompactStorage::setup(&types);
    assert_eq!(storage.column_offset(0), 2);
    assert_eq!(storage.max_storage_size(), 2 + 9);
}

#[test]
fn not_null_row_has_no_bitmap() {
    let storage = CompactStorage::setup(&[Type::not_null(SqlType::Integer), Type::not_null(SqlType::Decimal)]);
    assert_eq!(storage.column_offset(0), 0);
    assert_eq!(storage.max_storage_size(), 12);
}

#[test]
fn store_then_load_preserves_values_and_nulls() {
    let types = [
        Type::nullable(SqlType::Integer),
        Type::not_null(SqlType::Decimal),
        Type::nullable(SqlType::SmallInt),
    ];
    let storage = CompactStorage::setup(&types);
    let size = storage.max_storage_size() as usize;

    // (buf, a, a_null, b, c, c_null, out) -> bytes written;
    // out receives a, b as bits, c, and the three null flags.
    let f = jit(&[I64, I32, I8, F64, I16, I8, I64], &[I64], |cg, args| {
        let row = [
            Value::with_null(types[0], args[1], args[2]),
            Value::new(types[1], args[3]),
            Value::with_null(types[2], args[4], args[5]),
        ];
        let end = storage.store_values(cg, args[0], &row);
        let (loaded, _) = storage.load_values(cg, args[0]);
        let out = args[6];
        cg.store(loaded[0].value(), out, 0);
        let b = cg.bitcast_to_int(loaded[1].value());
        cg.store(b, out, 8);
        cg.store(loaded[2].value(), out, 16);
        for (i, value) in loaded.iter().enumerate() {
            let null = value.is_null(cg);
            cg.store(null, out, 24 + i as i32);
        }
        let written = cg.sub(end, args[0]);
        cg.ret(&[written]);
        Ok(())
    });

    #[repr(C)]
    #[derive(Default)]
    struct Out {
        a: i32,
        _pad: u32,
        b: u64,
        c: i16,
        _pad2: [u8; 6],
        nulls: [u8; 3],
    }

    let run: extern "C" fn(*mut u8, i32, u8, f64, i16, u8, *mut Out) -> i64 = unsafe { as_fn(f.ptr) };
    let mut buf = vec![0u8; size];
    let mut out = Out::default();

    assert_eq!(run(buf.as_mut_ptr(), 7, 0, 2.5, -3, 0, &mut out) as usize, size);
    assert_eq!((out.a, f64::from_bits(out.b), out.c), (7, 2.5, -3));
    assert_eq!(out.nulls, [0, 0, 0]);

    run(buf.as_mut_ptr(), 7, 1, 2.5, -3, 1, &mut out);
    assert_eq!(out.a, i32::MIN, "NULL column holds the sentinel");
    assert_eq!(out.c, i16::MIN);
    assert_eq!(out.nulls, [1, 0, 1]);
    assert_eq!(buf[0], 0b11);
}

#[test]
fn store_value_updates_one_null_bit() {
    let types = [Type::nullable(SqlType::Integer), Type::nullable(SqlType::Integer)];
    let storage = CompactStorage::setup(&types);

    let f = jit(&[I64, I32, I8], &[], |cg, args| {
        let value = Value::with_null(types[1], args[1], args[2]);
        storage.store_value(cg, args[0], 1, &value);
        cg.ret(&[]);
        Ok(())
    });
    let run: extern "C" fn(*mut u8, i32, u8) = unsafe { as_fn(f.ptr) };

    let mut buf = [0b01u8, 1, 0, 0, 0, 0, 0, 0, 0];
    run(buf.as_mut_ptr(), 0, 1);
    assert_eq!(buf[0], 0b11);
    assert_eq!(&buf[5..9], &i32::MIN.to_le_bytes());
    run(buf.as_mut_ptr(), 99, 0);
    assert_eq!(buf[0], 0b01, "first column's bit is kept");
    assert_eq!(&buf[5..9], &99i32.to_le_bytes());
}

#[test]
fn varlen_column_stores_pointer_and_length() {
    let types = [Type::nullable(SqlType::Varchar)];
    let storage = CompactStorage::setup(&types);

    let f = jit(&[I64, I64, I32], &[I32], |cg, args| {
        let null = cg.icmp_eq_const(args[1], 0);
        let value = Value::varlen(types[0], args[1], args[2], Some(null));
        storage.store_values(cg, args[0], &[value]);
        let loaded = storage.load_value(cg, args[0], 0);
        let eq = Value::test_equality(cg, &[value], &[loaded])?;
        let eq = cg.zext(eq.value(), I32);
        cg.ret(&[eq]);
        Ok(())
    });
    let run: extern "C" fn(*mut u8, *const u8, u32) -> i32 = unsafe { as_fn(f.ptr) };

    let text = b"quarry";
    let mut buf = [0u8; 13];
    assert_eq!(run(buf.as_mut_ptr(), text.as_ptr(), 6), 1);
    assert_eq!(u64::from_le_bytes(buf[1..9].try_into().unwrap()), text.as_ptr() as u64);
    assert_eq!(u32::from_le_bytes(buf[9..13].try_into().unwrap()), 6);

    assert_eq!(run(buf.as_mut_ptr(), std::ptr::null(), 6), 1);
    assert_eq!(buf[0], 1);
    assert_eq!(u32::from_le_bytes(buf[9..13].try_into().unwrap()), 0);
}
