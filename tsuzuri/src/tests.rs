//! tsuzuri のテストモジュール群
//!
//! 辞書のコンパイル、読み込み、サウンドフォールドの各機能を
//! 実ファイルを介して検証するテストを含みます。

mod compile_tests;
mod loading_tests;
mod soundfold_tests;
