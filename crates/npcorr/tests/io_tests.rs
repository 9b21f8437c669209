use npcorr::{
    Corr2, Corr2Builder, Corr3, Corr3Builder, JsonSink, JsonSource, PairKind, ResultSink,
    ResultSource, TripleKind,
};

mod common;

use common::RandomCatalog;

fn corr2_config(nbins: usize) -> npcorr::Corr2Config {
    Corr2Builder::new()
        .min_sep(0.5)
        .max_sep(20.0)
        .nbins(nbins)
        .build()
        .unwrap()
}

fn to_json(write: impl FnOnce(&mut JsonSink<Vec<u8>>)) -> Vec<u8> {
    let mut sink = JsonSink::new(Vec::new());
    write(&mut sink);
    sink.into_inner()
}

#[test]
fn pair_columns_survive_a_round_trip() {
    let data = RandomCatalog::new(200, 30.0, 12);
    let mut gg = Corr2::new(corr2_config(8), PairKind::GG).unwrap();
    gg.process(&data.shears(), None).unwrap();
    let bytes = to_json(|sink| gg.write(sink).unwrap());

    let mut back = Corr2::new(corr2_config(8), PairKind::GG).unwrap();
    back.read(&mut JsonSource::new(bytes.as_slice())).unwrap();
    assert_eq!(back.columns(), gg.columns());
    assert_eq!(back.tot(), gg.tot());
    assert_eq!(back.xipm(), gg.xipm());

    // writing the read-back result reproduces the document
    assert_eq!(to_json(|sink| back.write(sink).unwrap()), bytes);
}

#[test]
fn read_results_can_be_accumulated() {
    let data = RandomCatalog::new(150, 30.0, 2);
    let mut nn = Corr2::new(corr2_config(8), PairKind::NN).unwrap();
    nn.process(&data.counts(), None).unwrap();
    let bytes = to_json(|sink| nn.write(sink).unwrap());

    let mut back = Corr2::new(corr2_config(8), PairKind::NN).unwrap();
    back.read(&mut JsonSource::new(bytes.as_slice())).unwrap();
    back.try_add_assign(&nn).unwrap();
    let twice: Vec<f64> = nn.npairs().iter().map(|n| 2.0 * n).collect();
    assert_eq!(back.npairs(), twice.as_slice());
    assert_eq!(back.tot(), 2.0 * nn.tot());
}

#[test]
fn triangle_columns_survive_a_round_trip() {
    let data = RandomCatalog::new(60, 15.0, 7);
    let config = Corr3Builder::new()
        .min_sep(1.0)
        .max_sep(8.0)
        .nbins(4)
        .nubins(3)
        .nvbins(2)
        .build()
        .unwrap();
    let mut kkk = Corr3::new(config.clone(), TripleKind::KKK).unwrap();
    kkk.process(&[&data.scalars()]).unwrap();
    let mut sink = JsonSink::new(Vec::new()).pretty();
    kkk.write(&mut sink).unwrap();
    let bytes = sink.into_inner();

    let mut back = Corr3::new(config, TripleKind::KKK).unwrap();
    back.read(&mut JsonSource::new(bytes.as_slice())).unwrap();
    assert_eq!(back.columns(), kkk.columns());
    assert_eq!(back.tot(), kkk.tot());

    let table = JsonSource::new(bytes.as_slice()).read_table().unwrap();
    assert_eq!(table.meta.kind, "KKK");
    assert_eq!(table.n_rows(), kkk.ntri().len());
    assert_eq!(table.columns["zeta"], kkk.zeta());
}

#[test]
fn incompatible_tables() {
    let data = RandomCatalog::new(50, 30.0, 3);
    let mut kk = Corr2::new(corr2_config(8), PairKind::KK).unwrap();
    kk.process(&data.scalars(), None).unwrap();
    let bytes = to_json(|sink| kk.write(sink).unwrap());

    // a different kind
    let mut nn = Corr2::new(corr2_config(8), PairKind::NN).unwrap();
    let err = nn.read(&mut JsonSource::new(bytes.as_slice())).unwrap_err();
    assert!(err.is_incompatible());

    // a different binning
    let mut coarse = Corr2::new(corr2_config(4), PairKind::KK).unwrap();
    let err = coarse.read(&mut JsonSource::new(bytes.as_slice())).unwrap_err();
    assert!(err.is_incompatible());

    // a malformed document
    let mut table = JsonSource::new(bytes.as_slice()).read_table().unwrap();
    table.columns.insert("sigma".to_string(), vec![0.0; 8]);
    let mut sink = JsonSink::new(Vec::new());
    sink.write_table(&table).unwrap();
    let err = kk
        .read(&mut JsonSource::new(sink.into_inner().as_slice()))
        .unwrap_err();
    assert!(!err.is_incompatible());
    assert!(!err.is_configuration());
}
